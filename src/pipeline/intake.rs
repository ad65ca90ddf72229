// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Document intake and hashing.
//!
//! `ingest` enforces the size and format limits, hashes the raw bytes, stores
//! the blob under a content-addressed key and only then returns a
//! [`DocumentDescriptor`]. Nothing reaches blob storage for a document that
//! fails validation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::composer::content_hash;
use crate::ledger::{retry_with_backoff, RetryPolicy};
use crate::models::{ContentFormat, DocumentDescriptor, DocumentType, OwnerIdentity};
use crate::storage::{document_blob_key, BlobError, BlobStore};

/// Upload size limit (10 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Longest display name kept on a descriptor.
const MAX_DISPLAY_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("document is empty")]
    Empty,

    #[error("document is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported document format: {0}")]
    UnsupportedType(String),

    /// Transient blob failures outlasted the retry budget.
    #[error("blob storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("blob storage error: {0}")]
    Storage(String),
}

/// One upload as received at the boundary.
#[derive(Debug, Clone)]
pub struct Upload<'a> {
    pub document_type: DocumentType,
    /// Original file name, if the client sent one
    pub file_name: Option<&'a str>,
    pub bytes: &'a [u8],
    pub metadata: BTreeMap<String, String>,
}

pub struct DocumentIntake {
    blobs: Arc<dyn BlobStore>,
    retry: RetryPolicy,
    max_bytes: usize,
}

impl DocumentIntake {
    pub fn new(blobs: Arc<dyn BlobStore>, retry: RetryPolicy) -> Self {
        Self {
            blobs,
            retry,
            max_bytes: MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate, hash and durably store one document.
    pub async fn ingest(
        &self,
        owner: &OwnerIdentity,
        upload: Upload<'_>,
    ) -> Result<DocumentDescriptor, IntakeError> {
        let bytes = upload.bytes;
        if bytes.is_empty() {
            return Err(IntakeError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(IntakeError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        let format = ContentFormat::detect(bytes).ok_or_else(|| {
            IntakeError::UnsupportedType("expected a PDF, JPEG or PNG file".to_string())
        })?;

        // Digest first; the hash is fixed before any storage side effect.
        let hash = content_hash(bytes);
        let key = document_blob_key(owner.as_str(), &hash, format.extension());

        let locator = retry_with_backoff(self.retry, "blob put", BlobError::is_transient, || {
            self.blobs.put(&key, bytes)
        })
        .await
        .map_err(|e| match e {
            BlobError::Transient(reason) => IntakeError::StorageUnavailable(reason),
            other => IntakeError::Storage(other.to_string()),
        })?;

        let descriptor = DocumentDescriptor {
            id: Uuid::new_v4(),
            document_type: upload.document_type,
            display_name: display_name(upload.file_name, upload.document_type, format),
            content_hash: hash,
            storage_locator: locator,
            content_format: format,
            size_bytes: bytes.len() as u64,
            uploaded_at: Utc::now(),
            metadata: upload.metadata,
        };

        tracing::info!(
            owner = %owner,
            document_type = %descriptor.document_type,
            content_hash = %descriptor.content_hash,
            size = descriptor.size_bytes,
            "Document stored"
        );
        Ok(descriptor)
    }
}

/// Client file name with path components stripped, or `{type}.{ext}`.
fn display_name(
    file_name: Option<&str>,
    document_type: DocumentType,
    format: ContentFormat,
) -> String {
    let cleaned = file_name
        .map(|n| n.rsplit(['/', '\\']).next().unwrap_or(n).trim())
        .filter(|n| !n.is_empty())
        .map(|n| {
            n.chars()
                .filter(|c| !c.is_control())
                .take(MAX_DISPLAY_NAME_LEN)
                .collect::<String>()
        });

    cleaned.unwrap_or_else(|| format!("{}.{}", document_type, format.extension()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::{BlobError, FsBlobStore, StoragePaths};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Minimal valid PDF-looking payload of `len` bytes.
    pub(crate) fn pdf_bytes(len: usize, fill: u8) -> Vec<u8> {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.resize(len.max(bytes.len()), fill);
        bytes
    }

    /// Blob store that fails the first `failures` puts with `error`.
    pub(crate) struct FlakyBlobStore {
        pub failures: u32,
        pub error: BlobError,
        pub puts: AtomicU32,
    }

    #[async_trait]
    impl BlobStore for FlakyBlobStore {
        async fn put(&self, key: &str, _bytes: &[u8]) -> Result<String, BlobError> {
            let n = self.puts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(format!("mem://{key}"))
            }
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
            Err(BlobError::NotFound(key.to_string()))
        }

        async fn health_check(&self) -> Result<(), BlobError> {
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn owner() -> OwnerIdentity {
        OwnerIdentity::parse("owner-1").unwrap()
    }

    fn upload(bytes: &[u8]) -> Upload<'_> {
        Upload {
            document_type: DocumentType::TaxCertificate,
            file_name: Some("C:\\scans\\rfc.pdf"),
            bytes,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn ingest_stores_blob_and_returns_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(FsBlobStore::open(StoragePaths::new(dir.path())).unwrap());
        let intake = DocumentIntake::new(blobs.clone(), fast_retry());

        let bytes = pdf_bytes(1024, 0xAA);
        let descriptor = intake.ingest(&owner(), upload(&bytes)).await.unwrap();

        assert_eq!(descriptor.content_hash, content_hash(&bytes));
        assert_eq!(descriptor.content_format, ContentFormat::Pdf);
        assert_eq!(descriptor.size_bytes, 1024);
        assert_eq!(descriptor.display_name, "rfc.pdf");
        assert!(descriptor.storage_locator.ends_with(&format!("{}.pdf", descriptor.content_hash)));

        let key = document_blob_key("owner-1", &descriptor.content_hash, "pdf");
        assert_eq!(blobs.get(&key).await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn validation_failures_never_touch_storage() {
        let blobs = Arc::new(FlakyBlobStore {
            failures: 0,
            error: BlobError::Transient("unused".into()),
            puts: AtomicU32::new(0),
        });
        let intake = DocumentIntake::new(blobs.clone(), fast_retry()).with_max_bytes(2048);

        assert_eq!(
            intake.ingest(&owner(), upload(b"")).await.unwrap_err(),
            IntakeError::Empty
        );
        assert!(matches!(
            intake.ingest(&owner(), upload(&pdf_bytes(4096, 1))).await.unwrap_err(),
            IntakeError::TooLarge { size: 4096, limit: 2048 }
        ));
        assert!(matches!(
            intake.ingest(&owner(), upload(b"PK\x03\x04 zip")).await.unwrap_err(),
            IntakeError::UnsupportedType(_)
        ));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_limit_is_ten_mebibytes() {
        let blobs = Arc::new(FlakyBlobStore {
            failures: 0,
            error: BlobError::Transient("unused".into()),
            puts: AtomicU32::new(0),
        });
        let intake = DocumentIntake::new(blobs, fast_retry());

        assert!(intake
            .ingest(&owner(), upload(&pdf_bytes(MAX_DOCUMENT_BYTES, 0)))
            .await
            .is_ok());
        assert!(matches!(
            intake
                .ingest(&owner(), upload(&pdf_bytes(MAX_DOCUMENT_BYTES + 1, 0)))
                .await
                .unwrap_err(),
            IntakeError::TooLarge { .. }
        ));
    }

    #[tokio::test]
    async fn transient_blob_failures_are_retried() {
        let blobs = Arc::new(FlakyBlobStore {
            failures: 2,
            error: BlobError::Transient("busy".into()),
            puts: AtomicU32::new(0),
        });
        let intake = DocumentIntake::new(blobs.clone(), fast_retry());

        let descriptor = intake.ingest(&owner(), upload(&pdf_bytes(64, 2))).await.unwrap();
        assert!(descriptor.storage_locator.starts_with("mem://documents/owner-1/"));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_storage_unavailable() {
        let blobs = Arc::new(FlakyBlobStore {
            failures: 10,
            error: BlobError::Transient("busy".into()),
            puts: AtomicU32::new(0),
        });
        let intake = DocumentIntake::new(blobs.clone(), fast_retry());

        let err = intake.ingest(&owner(), upload(&pdf_bytes(64, 2))).await.unwrap_err();
        assert!(matches!(err, IntakeError::StorageUnavailable(_)));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_blob_failures_are_not_retried() {
        let blobs = Arc::new(FlakyBlobStore {
            failures: 10,
            error: BlobError::Permanent("read-only filesystem".into()),
            puts: AtomicU32::new(0),
        });
        let intake = DocumentIntake::new(blobs.clone(), fast_retry());

        let err = intake.ingest(&owner(), upload(&pdf_bytes(64, 2))).await.unwrap_err();
        assert!(matches!(err, IntakeError::Storage(_)));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn display_name_falls_back_to_type() {
        assert_eq!(
            display_name(None, DocumentType::BankStatement, ContentFormat::Png),
            "bank_statement.png"
        );
        assert_eq!(
            display_name(Some("  "), DocumentType::BankStatement, ContentFormat::Jpeg),
            "bank_statement.jpg"
        );
        assert_eq!(
            display_name(
                Some("../../etc/acta.pdf"),
                DocumentType::BusinessRegistration,
                ContentFormat::Pdf
            ),
            "acta.pdf"
        );
    }
}
