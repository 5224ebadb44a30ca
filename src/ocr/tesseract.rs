//! OCR through the host `tesseract` binary.

use std::fs::File;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use image::DynamicImage;
use tempfile::TempDir;

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError};
use super::model_utils::check_binary;

const BINARY: &str = "tesseract";

/// How often a running child is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runs `tesseract <image> <outbase> -l <language>` once per image.
pub struct TesseractBackend {
    language: String,
    timeout: Duration,
}

impl TesseractBackend {
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    pub fn with_config(config: OcrConfig) -> Self {
        Self {
            language: config.language,
            timeout: config.timeout,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `command` to completion, killing it once `timeout` has passed.
///
/// The child is always reaped, so a timed-out run leaves no process behind.
fn run_with_deadline(command: &mut Command, timeout: Duration) -> Result<ExitStatus, OcrError> {
    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            OcrError::BackendNotAvailable(format!("{} not found on PATH", BINARY))
        }
        _ => OcrError::Io(e),
    })?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!("{} killed after {:?}", BINARY, timeout);
            return Err(OcrError::TimedOut(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary(BINARY)
    }

    fn availability_hint(&self) -> String {
        if self.is_available() {
            format!("tesseract is available (language {})", self.language)
        } else {
            "tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        }
    }

    fn run_ocr(&self, image: &DynamicImage) -> Result<String, OcrError> {
        // one scratch dir per call; concurrent calls never share a path
        let scratch = TempDir::new()?;
        let path = scratch.path().join("page.png");
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| OcrError::ImageError(format!("Failed to write image: {}", e)))?;

        // output goes to files so a chatty child never blocks on a full pipe
        let out_base = scratch.path().join("out");
        let stderr_path = scratch.path().join("stderr.txt");
        let status = run_with_deadline(
            Command::new(BINARY)
                .arg(&path)
                .arg(&out_base)
                .args(["-l", &self.language])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(File::create(&stderr_path)?),
            self.timeout,
        )?;

        if !status.success() {
            let stderr = std::fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(OcrError::OcrFailed(format!(
                "{} exited with {}: {}",
                BINARY,
                status,
                stderr.trim()
            )));
        }

        let text = std::fs::read(out_base.with_extension("txt"))?;
        Ok(String::from_utf8_lossy(&text).into_owned())
    }
}
