//! Storage for extraction artifacts.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from an artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where extracted text and other artifacts are kept.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `content` under `key`, replacing any previous artifact.
    async fn put(&self, key: &str, content: &[u8], content_type: &str) -> Result<(), StoreError>;

    /// Fetch an artifact, or `None` if nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Artifact store backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    base_dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path for a key. Keys are relative, `/`-separated and may not leave
    /// the base directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, key: &str, content: &[u8], content_type: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::debug!(
            "Stored {} ({} bytes, {}) at {}",
            key,
            content.len(),
            content_type,
            path.display()
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
