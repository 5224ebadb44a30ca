//! Document processing pipeline.
//!
//! Extracts text, asks for topics, and stores the text as an artifact.
//! Separated from UI concerns - emits events for progress tracking.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::extract::{DocumentExtractor, Extraction};
use crate::llm::{LlmError, TopicExtractor};
use crate::storage::ArtifactStore;

/// Errors that stop a document from being processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Topic extraction failed: {0}")]
    Topics(#[from] LlmError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Events emitted while processing a batch of files.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Batch started
    Started { total_documents: usize },
    /// Document processing started
    DocumentStarted { filename: String },
    /// Text extracted
    DocumentExtracted {
        filename: String,
        units: u32,
        degraded: bool,
    },
    /// Document fully processed
    DocumentCompleted {
        filename: String,
        topics: usize,
        text_key: Option<String>,
    },
    /// Document failed
    DocumentFailed { filename: String, error: String },
    /// Batch complete
    Complete { succeeded: usize, failed: usize },
}

/// Outcome for one processed document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDocument {
    pub filename: String,
    pub extraction: Extraction,
    pub topics: Vec<String>,
    /// Key the text was stored under, if storing succeeded.
    pub text_key: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub documents: Vec<ProcessedDocument>,
    pub failed: Vec<(String, String)>,
}

/// Key for a document's extracted text: the filename up to its first dot.
pub fn text_key_for(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or(filename);
    format!("{}.txt", stem)
}

/// Extract, tag and store documents.
pub struct DocumentPipeline {
    extractor: Arc<DocumentExtractor>,
    topics: Arc<dyn TopicExtractor>,
    store: Arc<dyn ArtifactStore>,
}

impl DocumentPipeline {
    pub fn new(
        extractor: Arc<DocumentExtractor>,
        topics: Arc<dyn TopicExtractor>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            extractor,
            topics,
            store,
        }
    }

    /// Process one document held in memory.
    ///
    /// Topic extraction failures are returned as errors. A failure to store
    /// the text is logged and leaves `text_key` empty.
    pub async fn process_file(
        &self,
        filename: &str,
        content: &[u8],
        scan_images: bool,
    ) -> Result<ProcessedDocument, PipelineError> {
        let extraction = self.extractor.process(filename, content, scan_images).await;

        let topics = self.topics.extract_topics(&extraction.text).await?;
        tracing::info!("Extracted {} topic(s) from {}", topics.len(), filename);

        let key = text_key_for(filename);
        let text_key = match self
            .store
            .put(&key, extraction.text.as_bytes(), "text/plain")
            .await
        {
            Ok(()) => Some(key),
            Err(e) => {
                tracing::error!("Failed to store text file {}: {}", key, e);
                None
            }
        };

        Ok(ProcessedDocument {
            filename: filename.to_string(),
            extraction,
            topics,
            text_key,
            processed_at: Utc::now(),
        })
    }

    /// Process files from disk one at a time, reporting progress on `event_tx`.
    pub async fn process_paths(
        &self,
        paths: &[PathBuf],
        scan_images: bool,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> BatchResult {
        let mut result = BatchResult::default();

        let _ = event_tx
            .send(PipelineEvent::Started {
                total_documents: paths.len(),
            })
            .await;

        for path in paths {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let _ = event_tx
                .send(PipelineEvent::DocumentStarted {
                    filename: filename.clone(),
                })
                .await;

            let outcome = match tokio::fs::read(path).await {
                Ok(content) => self.process_file(&filename, &content, scan_images).await,
                Err(source) => Err(PipelineError::Read {
                    path: path.clone(),
                    source,
                }),
            };

            match outcome {
                Ok(doc) => {
                    let _ = event_tx
                        .send(PipelineEvent::DocumentExtracted {
                            filename: filename.clone(),
                            units: doc.extraction.units,
                            degraded: doc.extraction.is_degraded(),
                        })
                        .await;
                    let _ = event_tx
                        .send(PipelineEvent::DocumentCompleted {
                            filename: filename.clone(),
                            topics: doc.topics.len(),
                            text_key: doc.text_key.clone(),
                        })
                        .await;
                    result.documents.push(doc);
                }
                Err(e) => {
                    tracing::warn!("Failed to process {}: {}", filename, e);
                    let _ = event_tx
                        .send(PipelineEvent::DocumentFailed {
                            filename: filename.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    result.failed.push((filename, e.to_string()));
                }
            }
        }

        let _ = event_tx
            .send(PipelineEvent::Complete {
                succeeded: result.documents.len(),
                failed: result.failed.len(),
            })
            .await;

        result
    }
}
