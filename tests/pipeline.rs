//! Pipeline tests: extraction, topic tagging and text storage together.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use common::{ScriptedBackend, SheetSpec};
use docflow::llm::{LlmError, TopicExtractor};
use docflow::services::{DocumentPipeline, PipelineEvent};
use docflow::storage::{ArtifactStore, LocalArtifactStore};

/// Topic extractor that records the texts it was given.
struct RecordingTopics {
    seen: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingTopics {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl TopicExtractor for RecordingTopics {
    async fn extract_topics(&self, text: &str) -> Result<Vec<String>, LlmError> {
        self.seen.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(LlmError::Api("model unavailable".to_string()));
        }
        Ok(vec!["inventory".to_string(), "hardware".to_string()])
    }
}

fn pipeline(topics: Arc<RecordingTopics>, store: Arc<LocalArtifactStore>) -> DocumentPipeline {
    let extractor = Arc::new(common::extractor(Arc::new(ScriptedBackend::new())));
    DocumentPipeline::new(extractor, topics, store)
}

fn workbook() -> Vec<u8> {
    common::xlsx(&[SheetSpec {
        name: "Stock",
        rows: &[&["bolts", "12"]],
    }])
}

#[tokio::test]
async fn test_process_file_stores_text_and_topics() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LocalArtifactStore::new(dir.path()));
    let topics = Arc::new(RecordingTopics::new());
    let pipeline = pipeline(topics.clone(), store.clone());

    let doc = pipeline
        .process_file("stock.2024.xlsx", &workbook(), false)
        .await
        .unwrap();

    assert_eq!(doc.topics, vec!["inventory", "hardware"]);
    assert_eq!(doc.text_key.as_deref(), Some("stock.txt"));
    assert_eq!(doc.extraction.text, "--- Sheet: Stock ---\nbolts 12");

    let stored = store.get("stock.txt").await.unwrap().unwrap();
    assert_eq!(String::from_utf8(stored).unwrap(), doc.extraction.text);
    assert_eq!(topics.seen.lock().unwrap().as_slice(), [doc.extraction.text]);
}

#[tokio::test]
async fn test_process_file_topic_failure_is_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LocalArtifactStore::new(dir.path()));
    let pipeline = pipeline(Arc::new(RecordingTopics::failing()), store.clone());

    let result = pipeline.process_file("stock.xlsx", &workbook(), false).await;

    assert!(result.is_err());
    assert!(store.get("stock.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_process_paths_reports_events() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("stock.xlsx");
    std::fs::write(&input, workbook()).unwrap();
    let missing = dir.path().join("missing.xlsx");

    let store = Arc::new(LocalArtifactStore::new(dir.path().join("artifacts")));
    let pipeline = pipeline(Arc::new(RecordingTopics::new()), store);

    let (tx, mut rx) = mpsc::channel(32);
    let result = pipeline.process_paths(&[input, missing], false, tx).await;

    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].0, "missing.xlsx");

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(
        events.first(),
        Some(PipelineEvent::Started { total_documents: 2 })
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::DocumentCompleted { filename, topics: 2, .. } if filename == "stock.xlsx"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::DocumentFailed { filename, .. } if filename == "missing.xlsx"
    )));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Complete {
            succeeded: 1,
            failed: 1
        })
    ));
}
