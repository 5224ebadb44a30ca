//! Text extraction from uploaded documents.
//!
//! Supported formats:
//! - PDF (native text per page, optional OCR of embedded images)
//! - Slide decks, PPTX (shape text per slide, optional OCR of pictures)
//! - Spreadsheets, XLSX/XLS (tab-separated rows per sheet)
//!
//! Every extractor is best-effort: problems with one page, slide, image or
//! sheet are recorded as diagnostics and the rest of the document is still
//! returned. `DocumentExtractor` picks the extractor from the filename.

mod error;
mod orchestrator;
mod pdf;
mod slides;
mod spreadsheet;
mod types;

use async_trait::async_trait;

pub use error::ExtractError;
pub use orchestrator::DocumentExtractor;
pub use pdf::PdfExtractor;
pub use slides::SlideExtractor;
pub use spreadsheet::SpreadsheetExtractor;
pub use types::{
    render_sections, Diagnostic, DocumentFormat, Extraction, ExtractionBuilder, ExtractionStatus,
    Section, UNSUPPORTED_TEXT,
};

/// An extractor for one document format.
#[async_trait]
pub trait FormatExtractor: Send + Sync {
    /// The format this extractor handles.
    fn format(&self) -> DocumentFormat;

    /// Extract normalized text. Never fails; problems are reported in the
    /// returned status and diagnostics.
    async fn extract(&self, content: &[u8], scan_images: bool) -> Extraction;
}
