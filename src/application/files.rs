use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    pub is_file: bool,
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("file could not be read: {0}")]
    Other(String),
}

impl From<std::io::Error> for FileError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FileError::NotFound,
            std::io::ErrorKind::PermissionDenied => FileError::PermissionDenied,
            _ => FileError::Other(err.to_string()),
        }
    }
}

/// Read access to the files served under the base directory.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn stat(&self, path: &Path) -> Result<FileMeta, FileError>;

    async fn read(&self, path: &Path) -> Result<Bytes, FileError>;
}
