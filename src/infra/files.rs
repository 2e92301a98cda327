//! Filesystem access for the request pipeline, bounded by a per-call timeout.

use std::{future::Future, io, path::Path, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::application::files::{FileError, FileMeta, FileSource};

#[derive(Debug, Clone)]
pub struct LocalFileSource {
    timeout: Duration,
}

impl LocalFileSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn bounded<T>(&self, op: impl Future<Output = io::Result<T>>) -> Result<T, FileError> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result.map_err(FileError::from),
            Err(_) => Err(FileError::Other(format!(
                "timed out after {} ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn stat(&self, path: &Path) -> Result<FileMeta, FileError> {
        let metadata = self.bounded(fs::metadata(path)).await?;
        Ok(FileMeta {
            len: metadata.len(),
            is_file: metadata.is_file(),
        })
    }

    async fn read(&self, path: &Path) -> Result<Bytes, FileError> {
        self.bounded(fs::read(path)).await.map(Bytes::from)
    }
}
