// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blob storage for uploaded documents.
//!
//! The pipeline only needs two capabilities from blob storage, `put` and
//! `get`, so it talks to the [`BlobStore`] trait. [`FsBlobStore`] is the
//! filesystem implementation used in production and tests.
//!
//! ## Durability
//!
//! `put` writes to a temp file, fsyncs it and renames it into place. A
//! successful return means the bytes survive a crash; the intake layer relies
//! on this before it records a descriptor.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use super::StoragePaths;

/// Errors from blob storage, split by whether a retry can help.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlobError {
    /// Temporary condition (I/O interrupted, busy, timed out)
    #[error("transient blob storage error: {0}")]
    Transient(String),

    /// Retrying will not help (permissions, invalid key, disk layout)
    #[error("permanent blob storage error: {0}")]
    Permanent(String),

    /// No blob stored under the key
    #[error("blob not found: {0}")]
    NotFound(String),
}

impl BlobError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BlobError::Transient(_))
    }
}

impl From<io::Error> for BlobError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => BlobError::NotFound(e.to_string()),
            io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy => BlobError::Transient(e.to_string()),
            _ => BlobError::Permanent(e.to_string()),
        }
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Blob storage collaborator: `put(key, bytes) -> url`, `get(key) -> bytes`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Durably store `bytes` under `key` and return its locator URI.
    async fn put(&self, key: &str, bytes: &[u8]) -> BlobResult<String>;

    /// Read back the bytes stored under `key`.
    async fn get(&self, key: &str) -> BlobResult<Vec<u8>>;

    /// Verify the backend is reachable and writable.
    async fn health_check(&self) -> BlobResult<()>;
}

/// Filesystem blob store rooted at `{DATA_DIR}/blobs`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    paths: StoragePaths,
    public_base_url: Option<Url>,
}

impl FsBlobStore {
    /// Create the store and its root directory.
    pub fn open(paths: StoragePaths) -> BlobResult<Self> {
        fs::create_dir_all(paths.blobs_dir())?;
        Ok(Self {
            paths,
            public_base_url: None,
        })
    }

    /// Return `{base}/{key}` locators instead of `file://` URIs.
    pub fn with_public_base_url(mut self, base: Url) -> Self {
        self.public_base_url = Some(base);
        self
    }

    fn resolve(&self, key: &str) -> BlobResult<PathBuf> {
        if key.is_empty() || key.split('/').any(|s| s == ".." || s == ".") {
            return Err(BlobError::Permanent(format!("invalid blob key: {key}")));
        }
        Ok(self.paths.blob(key))
    }

    fn locator(&self, key: &str, path: &Path) -> BlobResult<String> {
        match &self.public_base_url {
            Some(base) => base
                .join(key)
                .map(|u| u.to_string())
                .map_err(|e| BlobError::Permanent(format!("invalid locator for {key}: {e}"))),
            None => Url::from_file_path(path)
                .map(|u| u.to_string())
                .map_err(|_| BlobError::Permanent(format!("non-absolute blob path for {key}"))),
        }
    }
}

/// Write via temp file + fsync + rename so a reader never sees partial bytes.
fn write_durable(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.flush()?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }

    Ok(())
}

fn read_all(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

async fn blocking<T, F>(f: F) -> BlobResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> BlobResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BlobError::Transient(format!("blob task failed: {e}")))?
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> BlobResult<String> {
        let path = self.resolve(key)?;
        let locator = self.locator(key, &path)?;
        let data = bytes.to_vec();

        blocking(move || write_durable(&path, &data).map_err(BlobError::from)).await?;

        tracing::debug!(key = %key, size = bytes.len(), "Blob stored");
        Ok(locator)
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        let path = self.resolve(key)?;
        blocking(move || read_all(&path).map_err(BlobError::from)).await
    }

    async fn health_check(&self) -> BlobResult<()> {
        let test_file = self.paths.blobs_dir().join(".health_check");
        blocking(move || {
            let test_data = b"health_check_data";
            write_durable(&test_file, test_data)?;
            let read_back = read_all(&test_file)?;
            fs::remove_file(&test_file)?;
            if read_back != test_data {
                return Err(BlobError::Permanent("health check data mismatch".to_string()));
            }
            Ok(())
        })
        .await
    }
}
