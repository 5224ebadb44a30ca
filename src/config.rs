//! Configuration management for docflow using the prefer crate.
//!
//! A config file (TOML, JSON or YAML) is discovered by `prefer` or passed
//! explicitly. Effective [`Settings`] are built from defaults, then the
//! file, then `DOCFLOW_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmConfig;
use crate::ocr::{OcrBackendType, OcrConfig};

/// Subdirectory of the data dir where extracted text is stored.
const ARTIFACTS_SUBDIR: &str = "artifacts";

/// Errors loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// OCR section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrFileConfig {
    /// Backend name (`tesseract` or `ocrs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Tesseract language code(s), e.g. `eng` or `eng+deu`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Maximum OCR jobs in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Per-image OCR timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_timeout_secs: Option<u64>,
    /// Directory containing OCR model files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub ocr: OcrFileConfig,
    /// LLM configuration for topic extraction.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no config file is found or it can't be read.
    pub async fn load() -> Self {
        match prefer::load("docflow").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file: {}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format is picked from the file extension (JSON if unknown).
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.set_data_dir(self.resolve_path(data_dir, base_dir));
        }
        if let Some(ref backend) = self.ocr.backend {
            match OcrBackendType::from_str(backend) {
                Some(backend) => settings.ocr_backend = backend,
                None => tracing::warn!("Unknown OCR backend in config: {}", backend),
            }
        }
        if let Some(ref language) = self.ocr.language {
            settings.ocr.language = language.clone();
        }
        if let Some(n) = self.ocr.max_concurrency {
            settings.ocr_concurrency = n.max(1);
        }
        if let Some(secs) = self.ocr.image_timeout_secs {
            settings.ocr.timeout = Duration::from_secs(secs);
        }
        if let Some(ref model_path) = self.ocr.model_path {
            settings.ocr.model_path = Some(self.resolve_path(model_path, base_dir));
        }
        settings.llm = self.llm.clone();
    }
}

/// Effective application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Directory for stored text artifacts.
    pub artifacts_dir: PathBuf,
    pub ocr_backend: OcrBackendType,
    pub ocr: OcrConfig,
    /// Maximum OCR jobs in flight.
    pub ocr_concurrency: usize,
    pub llm: LlmConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: local data dir -> home dir -> current dir
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docflow");

        Self {
            artifacts_dir: data_dir.join(ARTIFACTS_SUBDIR),
            data_dir,
            ocr_backend: OcrBackendType::default(),
            ocr: OcrConfig::default(),
            ocr_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            llm: LlmConfig::default(),
        }
    }
}

impl Settings {
    /// Build settings from a config: defaults, then the file, then the environment.
    pub fn from_config(config: &Config) -> Self {
        let mut settings = Self::default();
        let base_dir = config
            .base_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        config.apply_to_settings(&mut settings, &base_dir);
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Change the data directory, moving the artifacts directory with it.
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.artifacts_dir = data_dir.join(ARTIFACTS_SUBDIR);
        self.data_dir = data_dir;
    }

    /// Apply `DOCFLOW_*` overrides. Unparseable values are logged and ignored.
    ///
    /// Supported env vars:
    /// - `DOCFLOW_DATA_DIR`
    /// - `DOCFLOW_OCR_BACKEND`: "tesseract" or "ocrs"
    /// - `DOCFLOW_OCR_LANGUAGE`
    /// - `DOCFLOW_OCR_CONCURRENCY`
    /// - `DOCFLOW_OCR_TIMEOUT_SECS`
    /// - `DOCFLOW_LLM_ENDPOINT`
    /// - `DOCFLOW_LLM_MODEL`
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("DOCFLOW_DATA_DIR") {
            self.set_data_dir(PathBuf::from(shellexpand::tilde(&dir).as_ref()));
        }
        if let Some(val) = var("DOCFLOW_OCR_BACKEND") {
            match OcrBackendType::from_str(&val) {
                Some(backend) => self.ocr_backend = backend,
                None => tracing::warn!("Ignoring DOCFLOW_OCR_BACKEND={}", val),
            }
        }
        if let Some(val) = var("DOCFLOW_OCR_LANGUAGE") {
            self.ocr.language = val;
        }
        if let Some(val) = var("DOCFLOW_OCR_CONCURRENCY") {
            match val.trim().parse::<usize>() {
                Ok(n) => self.ocr_concurrency = n.max(1),
                Err(_) => tracing::warn!("Ignoring DOCFLOW_OCR_CONCURRENCY={}", val),
            }
        }
        if let Some(val) = var("DOCFLOW_OCR_TIMEOUT_SECS") {
            match val.trim().parse::<u64>() {
                Ok(secs) => self.ocr.timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!("Ignoring DOCFLOW_OCR_TIMEOUT_SECS={}", val),
            }
        }
        if let Some(val) = var("DOCFLOW_LLM_ENDPOINT") {
            self.llm.endpoint = val;
        }
        if let Some(val) = var("DOCFLOW_LLM_MODEL") {
            self.llm.model = val;
        }
    }

    /// Create the data and artifacts directories.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.artifacts_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_toml() {
        let config = Config::parse(
            r#"
            data_dir = "./data"

            [ocr]
            backend = "tesseract"
            language = "eng+deu"
            max_concurrency = 3

            [llm]
            model = "mistral"
            "#,
            "toml",
        )
        .unwrap();
        assert_eq!(config.data_dir.as_deref(), Some("./data"));
        assert_eq!(config.ocr.language.as_deref(), Some("eng+deu"));
        assert_eq!(config.ocr.max_concurrency, Some(3));
        assert_eq!(config.llm.model, "mistral");
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = Config::parse("ocr:\n  image_timeout_secs: 15\n", "yml").unwrap();
        assert_eq!(yaml.ocr.image_timeout_secs, Some(15));

        let json = Config::parse(r#"{"llm": {"enabled": false}}"#, "json").unwrap();
        assert!(!json.llm.enabled);
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Config::parse("data_dir = [", "toml").unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }

    #[tokio::test]
    async fn test_load_from_path_resolves_relative_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docflow.toml");
        std::fs::write(
            &path,
            "data_dir = \"store\"\n[ocr]\nbackend = \"tesseract\"\nimage_timeout_secs = 5\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.data_dir, dir.path().join("store"));
        assert_eq!(settings.artifacts_dir, dir.path().join("store").join("artifacts"));
        assert_eq!(settings.ocr.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let err = Config::load_from_path(Path::new("/nonexistent/docflow.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DOCFLOW_DATA_DIR", "/srv/docflow"),
            ("DOCFLOW_OCR_BACKEND", "OCRS"),
            ("DOCFLOW_OCR_CONCURRENCY", "0"),
            ("DOCFLOW_OCR_TIMEOUT_SECS", "not-a-number"),
            ("DOCFLOW_LLM_MODEL", "qwen2.5"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        let default_timeout = settings.ocr.timeout;
        settings.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.data_dir, PathBuf::from("/srv/docflow"));
        assert_eq!(settings.artifacts_dir, PathBuf::from("/srv/docflow/artifacts"));
        assert_eq!(settings.ocr_backend, OcrBackendType::Ocrs);
        assert_eq!(settings.ocr_concurrency, 1);
        assert_eq!(settings.ocr.timeout, default_timeout);
        assert_eq!(settings.llm.model, "qwen2.5");
    }
}
