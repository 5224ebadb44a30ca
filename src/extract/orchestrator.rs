//! Routes a document to the extractor for its format.

use std::sync::Arc;

use super::pdf::PdfExtractor;
use super::slides::SlideExtractor;
use super::spreadsheet::SpreadsheetExtractor;
use super::types::{DocumentFormat, Extraction, ExtractionStatus};
use super::FormatExtractor;
use crate::ocr::OcrFanout;

/// Single entry point for turning an uploaded file into normalized text.
///
/// The format is chosen from the filename extension alone. File types with
/// no extractor produce `Extraction::unsupported()` rather than an error.
pub struct DocumentExtractor {
    extractors: Vec<Arc<dyn FormatExtractor>>,
}

impl DocumentExtractor {
    /// Build the standard PDF, slide-deck and spreadsheet extractors sharing
    /// one OCR coordinator.
    pub fn new(ocr: Arc<OcrFanout>) -> Self {
        Self::with_extractors(vec![
            Arc::new(PdfExtractor::new(Arc::clone(&ocr))),
            Arc::new(SlideExtractor::new(ocr)),
            Arc::new(SpreadsheetExtractor::new()),
        ])
    }

    /// Use a custom set of extractors. Later entries never shadow earlier
    /// ones for the same format.
    pub fn with_extractors(extractors: Vec<Arc<dyn FormatExtractor>>) -> Self {
        Self { extractors }
    }

    fn extractor_for(&self, format: DocumentFormat) -> Option<&Arc<dyn FormatExtractor>> {
        self.extractors.iter().find(|e| e.format() == format)
    }

    /// Extract text from `content`, dispatching on `filename`'s extension.
    pub async fn process(&self, filename: &str, content: &[u8], scan_images: bool) -> Extraction {
        let Some(format) = DocumentFormat::from_filename(filename) else {
            tracing::info!("Unsupported file type: {}", filename);
            return Extraction::unsupported();
        };

        let Some(extractor) = self.extractor_for(format) else {
            tracing::warn!("No extractor registered for {} ({})", format, filename);
            return Extraction::unsupported();
        };

        if let Some(kind) = infer::get(content) {
            if !sniff_matches(format, kind.mime_type()) {
                tracing::debug!(
                    "{} looks like {} but is named as {}",
                    filename,
                    kind.mime_type(),
                    format
                );
            }
        }

        tracing::info!(
            "Extracting {} ({} bytes, format {}, scan_images={})",
            filename,
            content.len(),
            format,
            scan_images
        );

        let extraction = extractor.extract(content, scan_images).await;

        match &extraction.status {
            ExtractionStatus::Complete => tracing::info!(
                "Extracted {} unit(s) from {}",
                extraction.units,
                filename
            ),
            ExtractionStatus::Partial => tracing::warn!(
                "Partial extraction of {}: {} problem(s)",
                filename,
                extraction.diagnostics.len()
            ),
            ExtractionStatus::Failed { cause } => {
                tracing::warn!("Extraction of {} failed: {}", filename, cause)
            }
            ExtractionStatus::Unsupported => {}
        }

        extraction
    }
}

/// Whether a sniffed MIME type is plausible for a declared format.
fn sniff_matches(format: DocumentFormat, mime: &str) -> bool {
    match format {
        DocumentFormat::Pdf => mime == "application/pdf",
        // OOXML is a zip; legacy Office is a compound file
        DocumentFormat::SlideDeck | DocumentFormat::Spreadsheet => matches!(
            mime,
            "application/zip"
                | "application/x-ole-storage"
                | "application/vnd.ms-powerpoint"
                | "application/vnd.ms-excel"
                | "application/msword"
                | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
                | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                | "application/vnd.oasis.opendocument.spreadsheet"
        ),
    }
}
