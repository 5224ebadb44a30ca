//! Pure-Rust OCR through the `ocrs` engine.
//!
//! The detection and recognition models live in the configured model
//! directory (or `<local data dir>/docflow/models/ocrs`) and are fetched
//! there the first time the engine is needed.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use image::DynamicImage;

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError};
use super::model_utils::{has_models, resolve_model_dir, ModelFile};

const MODELS: [ModelFile; 2] = [
    ModelFile {
        name: "text-detection.rten",
        url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
        size_hint: "2.5 MB",
    },
    ModelFile {
        name: "text-recognition.rten",
        url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
        size_hint: "10 MB",
    },
];

/// Each backend owns its engine, loaded from its own model directory.
/// `OcrEngine` is `Sync` and all its calls take `&self`.
pub struct OcrsBackend {
    model_dir: PathBuf,
    engine: OnceLock<ocrs::OcrEngine>,
    /// Serializes first-use loading so models are fetched once.
    init: Mutex<()>,
}

impl OcrsBackend {
    pub fn with_config(config: OcrConfig) -> Self {
        Self {
            model_dir: resolve_model_dir(config.model_path.as_deref(), "ocrs"),
            engine: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    fn load_model(&self, file: &ModelFile) -> Result<rten::Model, OcrError> {
        let path = file.fetch_if_missing(&self.model_dir)?;
        rten::Model::load_file(&path)
            .map_err(|e| OcrError::ModelNotFound(format!("{}: {}", path.display(), e)))
    }

    fn engine(&self) -> Result<&ocrs::OcrEngine, OcrError> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }

        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }

        std::fs::create_dir_all(&self.model_dir)?;
        let [detection, recognition] = &MODELS;
        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(self.load_model(detection)?),
            recognition_model: Some(self.load_model(recognition)?),
            ..Default::default()
        })
        .map_err(|e| OcrError::OcrFailed(format!("engine init: {}", e)))?;

        Ok(self.engine.get_or_init(|| engine))
    }
}

impl OcrBackend for OcrsBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Ocrs
    }

    fn is_available(&self) -> bool {
        // missing models are fetched on first use
        true
    }

    fn availability_hint(&self) -> String {
        if has_models(&self.model_dir, &MODELS) {
            format!("models in {}", self.model_dir.display())
        } else {
            format!(
                "models (~12 MB) will be downloaded to {} on first use",
                self.model_dir.display()
            )
        }
    }

    fn run_ocr(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let engine = self.engine()?;

        let rgb = image.to_rgb8();
        let source = ocrs::ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| OcrError::ImageError(e.to_string()))?;
        let input = engine
            .prepare_input(source)
            .map_err(|e| OcrError::OcrFailed(format!("prepare input: {}", e)))?;
        engine
            .get_text(&input)
            .map_err(|e| OcrError::OcrFailed(format!("recognize: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_model_dir_is_used() {
        let backend = OcrsBackend::with_config(OcrConfig {
            model_path: Some(PathBuf::from("/srv/ocr-models")),
            ..Default::default()
        });
        assert_eq!(backend.model_dir, PathBuf::from("/srv/ocr-models"));
        assert!(backend.availability_hint().contains("/srv/ocr-models"));
    }

    #[test]
    fn test_backends_do_not_share_an_engine() {
        let a = OcrsBackend::with_config(OcrConfig {
            model_path: Some(PathBuf::from("/srv/models-a")),
            ..Default::default()
        });
        let b = OcrsBackend::with_config(OcrConfig {
            model_path: Some(PathBuf::from("/srv/models-b")),
            ..Default::default()
        });
        assert!(a.engine.get().is_none());
        assert!(b.engine.get().is_none());
        assert_ne!(a.model_dir, b.model_dir);
    }
}
