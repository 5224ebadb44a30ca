//! OCR for images embedded in documents.
//!
//! Recognizes text in decoded raster images using:
//! - Tesseract OCR via the host binary (default)
//! - OCRS for pure-Rust OCR (feature: ocr-ocrs)
//!
//! `OcrFanout` runs a backend over a batch of images concurrently and hands
//! results back in submission order.

mod backend;
mod fanout;
mod model_utils;
mod tesseract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;

use std::sync::Arc;

pub use backend::{
    decode_image, OcrBackend, OcrBackendType, OcrConfig, OcrError, DEFAULT_IMAGE_TIMEOUT,
};
pub use fanout::{EmbeddedImage, OcrFanout, OcrOutcome};
pub use model_utils::check_binary;
pub use tesseract::TesseractBackend;

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsBackend;

/// Build the backend for a configured backend type.
pub fn create_backend(
    backend_type: OcrBackendType,
    config: OcrConfig,
) -> Result<Arc<dyn OcrBackend>, OcrError> {
    match backend_type {
        OcrBackendType::Tesseract => Ok(Arc::new(TesseractBackend::with_config(config))),
        #[cfg(feature = "ocr-ocrs")]
        OcrBackendType::Ocrs => Ok(Arc::new(OcrsBackend::with_config(config))),
        #[cfg(not(feature = "ocr-ocrs"))]
        OcrBackendType::Ocrs => Err(OcrError::BackendNotAvailable(
            "ocrs support not compiled in (rebuild with --features ocr-ocrs)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tesseract_backend() {
        let backend = create_backend(OcrBackendType::Tesseract, OcrConfig::default()).unwrap();
        assert_eq!(backend.backend_type(), OcrBackendType::Tesseract);
    }

    #[cfg(not(feature = "ocr-ocrs"))]
    #[test]
    fn test_ocrs_requires_feature() {
        let err = create_backend(OcrBackendType::Ocrs, OcrConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, OcrError::BackendNotAvailable(_)));
    }
}
