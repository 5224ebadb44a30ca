//! Host tool probing and model file management for OCR backends.

// Model helpers are only reached when the ocr-ocrs feature is enabled
#![cfg_attr(not(feature = "ocr-ocrs"), allow(dead_code))]

use std::path::{Path, PathBuf};
use std::process::Command;

use super::backend::OcrError;

/// Check if an executable named `name` is on `PATH`.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// A model file an engine needs, with where to fetch it from.
pub struct ModelFile {
    pub name: &'static str,
    pub url: &'static str,
    /// Approximate download size, for log messages.
    pub size_hint: &'static str,
}

impl ModelFile {
    /// Download the file into `dir` unless it is already there.
    pub fn fetch_if_missing(&self, dir: &Path) -> Result<PathBuf, OcrError> {
        let dest = dir.join(self.name);
        if dest.is_file() {
            return Ok(dest);
        }
        tracing::info!("Downloading OCR model {} (~{})", self.name, self.size_hint);

        // fetch beside the destination, then rename: readers only ever see
        // a complete file, and a failed fetch never touches `dest`
        let partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.name))
            .suffix(".part")
            .tempfile_in(dir)?;
        download(self.url, partial.path())?;
        partial
            .persist(&dest)
            .map_err(|e| OcrError::Io(e.error))?;
        Ok(dest)
    }
}

/// Where a backend keeps its models when none is configured:
/// `<local data dir>/docflow/models/<engine>`.
pub fn default_model_dir(engine: &str) -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docflow")
        .join("models")
        .join(engine)
}

/// Pick the model directory: the configured one, else the default.
pub fn resolve_model_dir(configured: Option<&Path>, engine: &str) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_model_dir(engine))
}

/// True if every file is present in `dir`.
pub fn has_models(dir: &Path, files: &[ModelFile]) -> bool {
    files.iter().all(|f| dir.join(f.name).is_file())
}

/// Fetch `url` to `dest` with whichever of curl or wget is installed.
fn download(url: &str, dest: &Path) -> Result<(), OcrError> {
    let mut command = if check_binary("curl") {
        let mut c = Command::new("curl");
        c.args(["-fsSL", "-o"]).arg(dest).arg(url);
        c
    } else if check_binary("wget") {
        let mut c = Command::new("wget");
        c.args(["-q", "-O"]).arg(dest).arg(url);
        c
    } else {
        return Err(OcrError::BackendNotAvailable(
            "curl or wget is needed to download OCR models".to_string(),
        ));
    };

    let status = command.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(OcrError::ModelNotFound(format!(
            "download of {} failed ({})",
            url, status
        )))
    }
}
