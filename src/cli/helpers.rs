//! Shared helper functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use console::{style, StyledObject};

use docflow::config::Settings;
use docflow::extract::{DocumentExtractor, ExtractionStatus};
use docflow::ocr::{create_backend, OcrFanout};

/// Build the OCR coordinator for the configured backend.
pub fn build_fanout(settings: &Settings) -> anyhow::Result<Arc<OcrFanout>> {
    let backend = create_backend(settings.ocr_backend, settings.ocr.clone())?;
    if !backend.is_available() {
        eprintln!(
            "{} OCR backend {} is not available: {}",
            style("!").yellow(),
            backend.backend_type(),
            backend.availability_hint()
        );
    }
    Ok(Arc::new(
        OcrFanout::new(backend, settings.ocr_concurrency).with_timeout(settings.ocr.timeout),
    ))
}

/// Build the document extractor for the configured OCR backend.
pub fn build_extractor(settings: &Settings) -> anyhow::Result<Arc<DocumentExtractor>> {
    Ok(Arc::new(DocumentExtractor::new(build_fanout(settings)?)))
}

/// Read a document and return its display filename with the content.
pub async fn read_document(path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((filename, content))
}

/// Styled one-word label for an extraction status.
pub fn status_label(status: &ExtractionStatus) -> StyledObject<&'static str> {
    match status {
        ExtractionStatus::Complete => style("complete").green(),
        ExtractionStatus::Partial => style("partial").yellow(),
        ExtractionStatus::Failed { .. } => style("failed").red(),
        ExtractionStatus::Unsupported => style("unsupported").dim(),
    }
}

/// Truncate a string to max length with ellipsis.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
