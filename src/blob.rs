//! Blob storage for uploaded document bytes.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a [`BlobStore`].
#[derive(Debug, Error)]
pub enum BlobError {
    /// No object stored under the key.
    #[error("Blob '{0}' not found")]
    NotFound(String),
    /// Key is empty, absolute, or escapes the store root.
    #[error("Invalid blob key '{0}'")]
    InvalidKey(String),
    /// Filesystem failure.
    #[error("Blob I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage addressed by collection-scoped keys such as `<collection>/<file>`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `key`.
    async fn download(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Store `bytes` under `key` and return a locator URL.
    async fn upload(&self, key: &str, bytes: &[u8], mime_type: &str) -> Result<String, BlobError>;

    /// Remove the object; missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Store rooted at `root`; the directory is created lazily on upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let valid = !key.trim().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn upload(&self, key: &str, bytes: &[u8], mime_type: &str) -> Result<String, BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, mime_type, bytes = bytes.len(), "Blob stored");
        Ok(format!("file://{}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
