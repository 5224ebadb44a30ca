//! Process command: extract, tag and store documents.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;

use docflow::config::Settings;
use docflow::llm::LlmClient;
use docflow::services::{DocumentPipeline, PipelineEvent};
use docflow::storage::LocalArtifactStore;

use crate::cli::helpers::{build_extractor, truncate};

/// Run the full pipeline over one or more files.
pub async fn cmd_process(
    settings: &Settings,
    files: Vec<PathBuf>,
    scan_images: bool,
    json: bool,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let llm = LlmClient::new(settings.llm.clone())?;
    if !llm.is_available().await {
        println!(
            "{} LLM service not reachable at {} (model {})",
            style("!").yellow(),
            settings.llm.endpoint,
            settings.llm.model
        );
    }

    let pipeline = DocumentPipeline::new(
        build_extractor(settings)?,
        Arc::new(llm),
        Arc::new(LocalArtifactStore::new(&settings.artifacts_dir)),
    );

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);

    // Spawn event handler for UI
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::Started { total_documents } => {
                    println!(
                        "{} Processing {} document(s)",
                        style("→").cyan(),
                        total_documents
                    );
                }
                PipelineEvent::DocumentStarted { filename } => {
                    println!("  {} {}", style("…").dim(), truncate(&filename, 60));
                }
                PipelineEvent::DocumentExtracted {
                    filename,
                    units,
                    degraded,
                } => {
                    if degraded {
                        println!(
                            "    {} {}: extracted {} unit(s) with problems",
                            style("!").yellow(),
                            filename,
                            units
                        );
                    }
                }
                PipelineEvent::DocumentCompleted {
                    filename,
                    topics,
                    text_key,
                } => {
                    let stored = match text_key {
                        Some(key) => format!("stored as {}", key),
                        None => "text not stored".to_string(),
                    };
                    println!(
                        "    {} {}: {} topic(s), {}",
                        style("✓").green(),
                        filename,
                        topics,
                        stored
                    );
                }
                PipelineEvent::DocumentFailed { filename, error } => {
                    println!("    {} {}: {}", style("✗").red(), filename, error);
                }
                PipelineEvent::Complete { succeeded, failed } => {
                    println!(
                        "{} Done: {} succeeded, {} failed",
                        style("✓").green(),
                        succeeded,
                        failed
                    );
                }
            }
        }
    });

    let result = pipeline.process_paths(&files, scan_images, event_tx).await;
    let _ = event_handler.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.documents)?);
    } else {
        for doc in &result.documents {
            println!("\n{}", style(&doc.filename).bold());
            for topic in &doc.topics {
                println!("  - {}", topic);
            }
        }
    }

    if !result.failed.is_empty() {
        anyhow::bail!("{} document(s) failed", result.failed.len());
    }
    Ok(())
}
