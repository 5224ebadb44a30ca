//! OCR backend abstraction.
//!
//! Supports multiple OCR engines behind one trait:
//! - Tesseract: traditional OCR via the host `tesseract` binary (CPU)
//! - Ocrs: pure Rust OCR engine (CPU, feature `ocr-ocrs`)
//!
//! Backends are plain functions over their input: no shared mutable state,
//! safe to call from many blocking threads at once.

use std::path::PathBuf;
use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;

/// Default per-image timeout.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from OCR backends.
///
/// These are per-image results, never fatal for the enclosing document.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("OCR timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OcrBackendType {
    /// Tesseract OCR via command-line.
    #[default]
    Tesseract,
    /// Pure Rust OCR engine (ocrs crate).
    Ocrs,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::Ocrs => "ocrs",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            "ocrs" => Some(OcrBackendType::Ocrs),
            _ => None,
        }
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for OCR backends.
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Check if this backend is available (dependencies installed, models present).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Core OCR: extract text from a decoded image.
    fn run_ocr(&self, image: &DynamicImage) -> Result<String, OcrError>;

    /// Decode an encoded image buffer and recognize its text.
    ///
    /// Returns an empty string when the engine finds nothing; that is not
    /// a failure.
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        let image = decode_image(image_bytes)?;
        let text = self.run_ocr(&image)?;
        Ok(text.trim().to_string())
    }
}

/// Decode raw image bytes (PNG, JPEG, TIFF, ...) with format sniffing.
pub fn decode_image(image_bytes: &[u8]) -> Result<DynamicImage, OcrError> {
    if image_bytes.is_empty() {
        return Err(OcrError::ImageError("empty image buffer".to_string()));
    }
    image::load_from_memory(image_bytes)
        .map_err(|e| OcrError::ImageError(format!("Failed to decode image: {}", e)))
}

/// Configuration for OCR backends (language, model paths).
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Language for OCR (e.g., "eng", "chi_sim").
    pub language: String,
    /// Path to model files (for backends that need them).
    pub model_path: Option<PathBuf>,
    /// Longest a single recognition may run before it is abandoned.
    pub timeout: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            model_path: None,
            timeout: DEFAULT_IMAGE_TIMEOUT,
        }
    }
}
