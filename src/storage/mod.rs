// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state for the attestation pipeline. Everything lives under
//! `DATA_DIR` (default `/data`).
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   blobs/
//!     documents/{owner}/{sha256}.{ext}   # Content-addressed document blobs
//!   db/
//!     providers.redb                     # Provider records, document rows, buyer profiles
//!   audit/
//!     {date}/events.jsonl                # Daily audit logs
//! ```
//!
//! ## Collaborator Traits
//!
//! The pipeline depends on [`BlobStore`] and [`RecordStore`], never on the
//! concrete filesystem or redb types, so tests can inject failing doubles.

pub mod audit;
pub mod blob_fs;
pub mod paths;
pub mod record_cache;
pub mod record_db;

pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use blob_fs::{BlobError, BlobStore, FsBlobStore};
pub use paths::{document_blob_key, StoragePaths};
pub use record_cache::{CachedRecordStore, RecordCache};
pub use record_db::{
    AttestationDraft, BeginOutcome, RecordResult, RecordStore, RecordStoreError, RedbRecordStore,
};
