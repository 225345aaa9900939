//! Flat-file asset cache under the plugin data directory.
//!
//! Layout: label files at the path named by `mdFilePath`, rendered text faces
//! at `images/<name>.svg`, remote image faces at `last/<name>.png`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache path `{0}`")]
    InvalidPath(String),
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct AssetCache {
    root: PathBuf,
}

impl AssetCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative cache path. Absolute paths and `..` are rejected.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, CacheError> {
        let candidate = Path::new(relative);
        if relative.trim().is_empty() {
            return Err(CacheError::InvalidPath(relative.to_string()));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(CacheError::InvalidPath(relative.to_string()));
                }
            }
        }
        Ok(self.root.join(candidate))
    }

    /// Read a text file; `None` when it does not exist.
    pub async fn read_text(&self, relative: &str) -> Result<Option<String>, CacheError> {
        let path = self.resolve(relative)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    /// Read a binary file; `None` when it does not exist.
    pub async fn read_bytes(&self, relative: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    pub async fn write_text(&self, relative: &str, text: &str) -> Result<PathBuf, CacheError> {
        self.write_bytes(relative, text.as_bytes()).await
    }

    /// Write a file, creating parent directories as needed.
    pub async fn write_bytes(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| io_error(&path, source))?;
        Ok(path)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}
