//! Concurrent OCR over a batch of images.
//!
//! Every image in a batch gets its own job on the blocking pool. A semaphore
//! bounds how many run at once, and each job runs under its own timeout.
//! Results come back in submission order no matter which job finishes first.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use super::backend::{OcrBackend, OcrError, DEFAULT_IMAGE_TIMEOUT};

/// An encoded image found inside a structural unit of a document.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    /// 1-based index of the owning page/slide.
    pub unit: u32,
    /// 1-based position of the image within its unit.
    pub ordinal: u32,
    /// Encoded image bytes (PNG, JPEG, ...).
    pub data: Vec<u8>,
}

impl EmbeddedImage {
    pub fn new(unit: u32, ordinal: u32, data: Vec<u8>) -> Self {
        Self {
            unit,
            ordinal,
            data,
        }
    }
}

/// OCR outcome for one image, keyed by the image's position.
#[derive(Debug)]
pub struct OcrOutcome {
    pub unit: u32,
    pub ordinal: u32,
    pub result: Result<String, OcrError>,
}

impl OcrOutcome {
    /// Recognized text, if recognition succeeded and found something.
    pub fn text(&self) -> Option<&str> {
        match &self.result {
            Ok(text) if !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        }
    }
}

/// Fans OCR work out over a shared backend.
pub struct OcrFanout {
    backend: Arc<dyn OcrBackend>,
    permits: Arc<Semaphore>,
    image_timeout: Duration,
}

impl OcrFanout {
    /// Create a coordinator allowing `max_concurrency` OCR jobs in flight.
    pub fn new(backend: Arc<dyn OcrBackend>, max_concurrency: usize) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
        }
    }

    /// Set the per-image timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &Arc<dyn OcrBackend> {
        &self.backend
    }

    /// Run OCR on every image and return one outcome per image, in input order.
    ///
    /// All jobs are started before any is awaited; a failure or timeout in
    /// one slot never cancels the others.
    pub async fn recognize_all(&self, images: Vec<EmbeddedImage>) -> Vec<OcrOutcome> {
        if images.is_empty() {
            return Vec::new();
        }

        tracing::debug!(
            "Dispatching OCR for {} image(s) via {}",
            images.len(),
            self.backend.backend_type()
        );

        let jobs = images.into_iter().map(|image| self.recognize_one(image));
        join_all(jobs).await
    }

    async fn recognize_one(&self, image: EmbeddedImage) -> OcrOutcome {
        let EmbeddedImage {
            unit,
            ordinal,
            data,
        } = image;

        // The permit stays on this task, so it is released at the deadline
        // even if the blocking job is still running.
        let result = match self.permits.clone().acquire_owned().await {
            Ok(_permit) => {
                let backend = Arc::clone(&self.backend);
                let job = tokio::task::spawn_blocking(move || backend.recognize(&data));

                match tokio::time::timeout(self.image_timeout, job).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => Err(OcrError::OcrFailed(format!(
                        "OCR worker panicked: {}",
                        join_err
                    ))),
                    Err(_) => Err(OcrError::TimedOut(self.image_timeout)),
                }
            }
            Err(_) => Err(OcrError::OcrFailed("OCR semaphore closed".to_string())),
        };

        if let Err(ref e) = result {
            tracing::warn!("OCR failed for unit {} image {}: {}", unit, ordinal, e);
        }

        OcrOutcome {
            unit,
            ordinal,
            result,
        }
    }
}
