// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk storage layout.

use std::path::{Path, PathBuf};

/// Base directory for all persistent storage.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Blob Paths ==========

    /// Directory containing all document blobs.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Path of a blob for a slash-separated key.
    ///
    /// Keys are produced by [`document_blob_key`] and never contain `..`.
    pub fn blob(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.blobs_dir(), |path, segment| path.join(segment))
    }

    // ========== Record Database ==========

    /// Path to the redb provider record database.
    pub fn records_db(&self) -> PathBuf {
        self.root.join("db").join("providers.redb")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

/// Content-addressed blob key for an owner's document.
///
/// Format: `documents/{owner}/{sha256}.{ext}`. The same bytes uploaded by the
/// same owner always map to the same key, so a retried put is idempotent.
pub fn document_blob_key(owner: &str, content_hash: &str, extension: &str) -> String {
    format!("documents/{owner}/{content_hash}.{extension}")
}
