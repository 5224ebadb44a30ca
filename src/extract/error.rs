//! Container-level extraction errors.

use thiserror::Error;

/// Errors that stop an extractor from reading a document container.
///
/// These never leave the extractor: they become `ExtractionStatus::Failed`.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Missing package part: {0}")]
    MissingPart(String),

    #[error("Legacy binary format not supported: {0}")]
    LegacyFormat(String),

    #[error("Unsupported image encoding: {0}")]
    UnsupportedImage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
