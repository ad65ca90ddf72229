// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider record store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `providers`: owner_identity → serialized ProviderRecord (documents stripped)
//! - `provider_documents`: composite key (owner|position) → serialized DocumentMetadata
//! - `buyer_profiles`: owner_identity → serialized BuyerProfile
//!
//! Every operation runs in a single redb transaction. Records are keyed by the
//! unique owner identity, so independent owners never contend on a row.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};

use crate::models::{
    AttestationMarker, BuyerProfile, DocumentMetadata, LedgerReference, OwnerIdentity,
    ProfileRole, ProviderDetails, ProviderRecord, ProviderStatus,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: owner_identity → ProviderRecord JSON (without documents).
const PROVIDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("providers");

/// Document metadata rows: `owner|position` → DocumentMetadata JSON, one per descriptor.
const PROVIDER_DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("provider_documents");

/// Buyer profiles, consulted for role resolution only.
const BUYER_PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("buyer_profiles");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Store temporarily unreachable (used by non-embedded backends and tests)
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("provider record not found: {0}")]
    NotFound(String),

    #[error("provider {0} is already attested with a different document set")]
    AlreadyAttested(String),

    #[error("an attestation for provider {0} is already in flight")]
    InFlight(String),

    #[error("provider {owner} cannot move from {from} to {to}")]
    InvalidTransition {
        owner: String,
        from: ProviderStatus,
        to: ProviderStatus,
    },

    #[error("provider {0} has no confirmed attestation to review")]
    NotAnchored(String),
}

impl RecordStoreError {
    /// Whether retrying the same operation can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RecordStoreError::Unavailable(_) => true,
            RecordStoreError::RedbStorage(redb::StorageError::Io(_)) => true,
            RecordStoreError::RedbCommit(redb::CommitError::Storage(redb::StorageError::Io(_))) => {
                true
            }
            RecordStoreError::RedbTransaction(redb::TransactionError::Storage(
                redb::StorageError::Io(_),
            )) => true,
            _ => false,
        }
    }
}

pub type RecordResult<T> = Result<T, RecordStoreError>;

// =============================================================================
// Store Interface
// =============================================================================

/// Input to step (a) of the persistence saga.
#[derive(Debug, Clone)]
pub struct AttestationDraft {
    pub owner: OwnerIdentity,
    pub combined_hash: String,
    pub document_count: usize,
    pub documents: Vec<DocumentMetadata>,
    pub details: Option<ProviderDetails>,
}

/// Result of [`RecordStore::begin_attestation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Record written with a `submitting` marker; the ledger should be called.
    Proceed(ProviderRecord),
    /// Record already anchored for this exact document set.
    AlreadyAnchored(ProviderRecord),
}

/// Relational store collaborator for provider records.
pub trait RecordStore: Send + Sync {
    /// Look up a provider record with its document rows.
    fn get(&self, owner: &OwnerIdentity) -> RecordResult<Option<ProviderRecord>>;

    /// Create or resume a record with status `pending` and mark it submitting.
    ///
    /// An anchored record with the same combined hash short-circuits. An
    /// unanchored record keeps its document rows when the hash matches and has
    /// them replaced otherwise. A `submitting` marker younger than
    /// `in_flight_window` is treated as a concurrent submission.
    fn begin_attestation(
        &self,
        draft: &AttestationDraft,
        in_flight_window: chrono::Duration,
    ) -> RecordResult<BeginOutcome>;

    /// Attach a confirmed ledger reference. Status is left unchanged.
    fn mark_anchored(
        &self,
        owner: &OwnerIdentity,
        reference: &LedgerReference,
    ) -> RecordResult<ProviderRecord>;

    /// Record a failed ledger leg; the reference stays null.
    fn mark_attestation_failed(
        &self,
        owner: &OwnerIdentity,
        reason: &str,
        retryable: bool,
    ) -> RecordResult<ProviderRecord>;

    /// Manual review transition on an anchored record.
    fn set_review_status(
        &self,
        owner: &OwnerIdentity,
        next: ProviderStatus,
    ) -> RecordResult<ProviderRecord>;

    /// Resolve the marketplace profile of an identity.
    fn resolve_role(&self, owner: &OwnerIdentity) -> RecordResult<ProfileRole>;

    /// Insert or replace a buyer profile.
    ///
    /// Buyer onboarding lives outside this service. This is the write hook
    /// for that collaborator: it fills the table [`RecordStore::resolve_role`]
    /// reads, and nothing in the attestation flow calls it.
    fn insert_buyer_profile(&self, profile: &BuyerProfile) -> RecordResult<()>;
}

// =============================================================================
// Key Helpers
// =============================================================================

/// Composite document row key: `owner|position`.
///
/// The position is zero-padded so a range scan yields upload order. The same
/// bytes filed under two document types get two rows. Owner identities never
/// contain `|`, so a prefix scan is exact.
fn document_key(owner: &str, position: usize) -> String {
    format!("{owner}|{position:04}")
}

/// Half-open key range covering every document row of an owner.
fn document_range(owner: &str) -> (String, String) {
    // '}' sorts immediately after '|'
    (format!("{owner}|"), format!("{owner}}}"))
}

fn read_record<P, D>(
    providers: &P,
    documents: &D,
    owner: &str,
) -> RecordResult<Option<ProviderRecord>>
where
    P: ReadableTable<&'static str, &'static [u8]>,
    D: ReadableTable<&'static str, &'static [u8]>,
{
    let mut record: ProviderRecord = match providers.get(owner)? {
        Some(value) => serde_json::from_slice(value.value())?,
        None => return Ok(None),
    };

    let (start, end) = document_range(owner);
    record.documents = Vec::new();
    for entry in documents.range(start.as_str()..end.as_str())? {
        let (_, value) = entry?;
        record.documents.push(serde_json::from_slice(value.value())?);
    }

    Ok(Some(record))
}

// =============================================================================
// RedbRecordStore
// =============================================================================

/// Embedded ACID provider record store.
pub struct RedbRecordStore {
    db: Database,
}

impl RedbRecordStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> RecordResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RecordStoreError::Unavailable(format!("create db dir: {e}")))?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PROVIDERS)?;
            let _ = write_txn.open_table(PROVIDER_DOCUMENTS)?;
            let _ = write_txn.open_table(BUYER_PROFILES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn load(txn: &WriteTransaction, owner: &str) -> RecordResult<Option<ProviderRecord>> {
        let providers = txn.open_table(PROVIDERS)?;
        let documents = txn.open_table(PROVIDER_DOCUMENTS)?;
        read_record(&providers, &documents, owner)
    }

    fn load_existing(
        txn: &WriteTransaction,
        owner: &OwnerIdentity,
    ) -> RecordResult<ProviderRecord> {
        Self::load(txn, owner.as_str())?
            .ok_or_else(|| RecordStoreError::NotFound(owner.to_string()))
    }

    /// Write the record row. Document rows are only touched when
    /// `replace_documents` is set.
    fn store(
        txn: &WriteTransaction,
        record: &ProviderRecord,
        replace_documents: bool,
    ) -> RecordResult<()> {
        let owner = record.owner_identity.as_str();

        let mut row = record.clone();
        row.documents = Vec::new();
        let json = serde_json::to_vec(&row)?;

        let mut providers = txn.open_table(PROVIDERS)?;
        providers.insert(owner, json.as_slice())?;

        if replace_documents {
            let mut documents = txn.open_table(PROVIDER_DOCUMENTS)?;
            let (start, end) = document_range(owner);
            let stale: Vec<String> = documents
                .range(start.as_str()..end.as_str())?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<_, redb::StorageError>>()?;
            for key in stale {
                documents.remove(key.as_str())?;
            }
            for (position, doc) in record.documents.iter().enumerate() {
                let doc_json = serde_json::to_vec(doc)?;
                documents.insert(document_key(owner, position).as_str(), doc_json.as_slice())?;
            }
        }
        Ok(())
    }

    fn update<F>(&self, owner: &OwnerIdentity, apply: F) -> RecordResult<ProviderRecord>
    where
        F: FnOnce(&mut ProviderRecord) -> RecordResult<()>,
    {
        let write_txn = self.db.begin_write()?;
        let mut record = Self::load_existing(&write_txn, owner)?;
        apply(&mut record)?;
        record.updated_at = Utc::now();
        Self::store(&write_txn, &record, false)?;
        write_txn.commit()?;
        Ok(record)
    }
}

fn is_in_flight(marker: &AttestationMarker, now: DateTime<Utc>, window: chrono::Duration) -> bool {
    matches!(marker, AttestationMarker::Submitting { since } if now - *since < window)
}

impl RecordStore for RedbRecordStore {
    fn get(&self, owner: &OwnerIdentity) -> RecordResult<Option<ProviderRecord>> {
        let read_txn = self.db.begin_read()?;
        let providers = read_txn.open_table(PROVIDERS)?;
        let documents = read_txn.open_table(PROVIDER_DOCUMENTS)?;
        read_record(&providers, &documents, owner.as_str())
    }

    fn begin_attestation(
        &self,
        draft: &AttestationDraft,
        in_flight_window: chrono::Duration,
    ) -> RecordResult<BeginOutcome> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;

        let (record, replace_documents) = match Self::load(&write_txn, draft.owner.as_str())? {
            None => {
                let record = ProviderRecord {
                    id: uuid::Uuid::new_v4(),
                    owner_identity: draft.owner.clone(),
                    status: ProviderStatus::Pending,
                    ledger_reference: None,
                    attestation: AttestationMarker::Submitting { since: now },
                    combined_hash: draft.combined_hash.clone(),
                    document_count: draft.document_count,
                    documents: draft.documents.clone(),
                    details: draft.details.clone(),
                    created_at: now,
                    updated_at: now,
                };
                (record, true)
            }
            Some(existing) if existing.is_anchored() => {
                // Nothing to write; dropping the transaction aborts it.
                return if existing.combined_hash == draft.combined_hash {
                    Ok(BeginOutcome::AlreadyAnchored(existing))
                } else {
                    Err(RecordStoreError::AlreadyAttested(draft.owner.to_string()))
                };
            }
            Some(existing) if is_in_flight(&existing.attestation, now, in_flight_window) => {
                return Err(RecordStoreError::InFlight(draft.owner.to_string()));
            }
            Some(mut existing) => {
                let replace = existing.combined_hash != draft.combined_hash;
                if replace {
                    existing.combined_hash = draft.combined_hash.clone();
                    existing.document_count = draft.document_count;
                    existing.documents = draft.documents.clone();
                }
                if draft.details.is_some() {
                    existing.details = draft.details.clone();
                }
                existing.attestation = AttestationMarker::Submitting { since: now };
                existing.updated_at = now;
                (existing, replace)
            }
        };

        Self::store(&write_txn, &record, replace_documents)?;
        write_txn.commit()?;

        tracing::debug!(
            owner = %record.owner_identity,
            combined_hash = %record.combined_hash,
            replaced_documents = replace_documents,
            "Provider record ready for attestation"
        );
        Ok(BeginOutcome::Proceed(record))
    }

    fn mark_anchored(
        &self,
        owner: &OwnerIdentity,
        reference: &LedgerReference,
    ) -> RecordResult<ProviderRecord> {
        self.update(owner, |record| {
            if record.ledger_reference.is_none() {
                record.ledger_reference = Some(reference.clone());
            }
            record.attestation = AttestationMarker::Anchored;
            Ok(())
        })
    }

    fn mark_attestation_failed(
        &self,
        owner: &OwnerIdentity,
        reason: &str,
        retryable: bool,
    ) -> RecordResult<ProviderRecord> {
        self.update(owner, |record| {
            // A confirmed anchor is never downgraded.
            if !record.is_anchored() {
                record.attestation = AttestationMarker::Failed {
                    reason: reason.to_string(),
                    retryable,
                    at: Utc::now(),
                };
            }
            Ok(())
        })
    }

    fn set_review_status(
        &self,
        owner: &OwnerIdentity,
        next: ProviderStatus,
    ) -> RecordResult<ProviderRecord> {
        self.update(owner, |record| {
            if !record.is_anchored() {
                return Err(RecordStoreError::NotAnchored(owner.to_string()));
            }
            if !record.status.can_transition_to(next) {
                return Err(RecordStoreError::InvalidTransition {
                    owner: owner.to_string(),
                    from: record.status,
                    to: next,
                });
            }
            record.status = next;
            Ok(())
        })
    }

    fn resolve_role(&self, owner: &OwnerIdentity) -> RecordResult<ProfileRole> {
        let read_txn = self.db.begin_read()?;

        let providers = read_txn.open_table(PROVIDERS)?;
        if let Some(value) = providers.get(owner.as_str())? {
            let record: ProviderRecord = serde_json::from_slice(value.value())?;
            return Ok(ProfileRole::ProviderProfile {
                status: record.status,
            });
        }

        let buyers = read_txn.open_table(BUYER_PROFILES)?;
        if buyers.get(owner.as_str())?.is_some() {
            return Ok(ProfileRole::BuyerProfile);
        }

        Ok(ProfileRole::Unregistered)
    }

    fn insert_buyer_profile(&self, profile: &BuyerProfile) -> RecordResult<()> {
        let json = serde_json::to_vec(profile)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BUYER_PROFILES)?;
            table.insert(profile.owner_identity.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
