// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistence coordinator (saga).
//!
//! ```text
//! (a) record store: create/resume ProviderRecord, status=pending, marker=submitting
//! (b) ledger:       submit commitment, wait for confirmed inclusion
//! (c) record store: attach ledger reference, marker=anchored (status stays pending)
//! ```
//!
//! The two stores are never updated atomically. If (a) fails the ledger is not
//! called. If (b) fails the record keeps a null reference and a `failed`
//! marker, and a later submit for the same owner resumes from (a) without
//! re-entering metadata. If (c) fails after the ledger confirmed, the
//! reference is logged and held in memory, the record is marked retryably
//! failed and the caller gets a retryable error. A retry for the same
//! commitment then goes straight to (c) with the held reference instead of
//! anchoring again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::composer::AttestationCommitment;
use super::error::PipelineError;
use super::session::SubmissionOutcome;
use crate::ledger::{retry_with_backoff, LedgerAdapter, RetryPolicy};
use crate::models::{
    DocumentDescriptor, DocumentMetadata, LedgerReference, OwnerIdentity, ProviderDetails,
    ProviderRecord,
};
use crate::storage::{
    AttestationDraft, AuditEvent, AuditEventType, AuditLog, BeginOutcome, RecordStore,
    RecordStoreError,
};

/// A ledger reference the record store has not accepted yet.
#[derive(Debug, Clone)]
struct UnrecordedAnchor {
    combined_hash: String,
    record_id: Uuid,
    reference: LedgerReference,
}

pub struct PersistenceCoordinator {
    records: Arc<dyn RecordStore>,
    ledger: LedgerAdapter,
    audit: Arc<AuditLog>,
    store_retry: RetryPolicy,
    in_flight_window: chrono::Duration,
    unrecorded: Mutex<HashMap<OwnerIdentity, UnrecordedAnchor>>,
}

impl PersistenceCoordinator {
    /// `in_flight_window` is how long a `submitting` marker blocks another
    /// submission for the same owner. It should exceed the ledger deadline.
    pub fn new(
        records: Arc<dyn RecordStore>,
        ledger: LedgerAdapter,
        audit: Arc<AuditLog>,
        store_retry: RetryPolicy,
        in_flight_window: chrono::Duration,
    ) -> Self {
        Self {
            records,
            ledger,
            audit,
            store_retry,
            in_flight_window,
            unrecorded: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &LedgerAdapter {
        &self.ledger
    }

    /// Run the saga for one commitment.
    pub async fn persist(
        &self,
        commitment: &AttestationCommitment,
        documents: &[DocumentDescriptor],
        details: Option<ProviderDetails>,
    ) -> Result<SubmissionOutcome, PipelineError> {
        let owner = &commitment.owner_identity;

        if let Some(held) = self.take_unrecorded(owner, &commitment.combined_hash) {
            tracing::info!(
                owner = %owner,
                transaction = %held.reference.transaction,
                "Reusing confirmed ledger reference, skipping ledger"
            );
            return self.record_reference(owner, held).await;
        }

        // (a) record
        let draft = AttestationDraft {
            owner: owner.clone(),
            combined_hash: commitment.combined_hash.clone(),
            document_count: commitment.document_count,
            documents: documents.iter().map(DocumentMetadata::from).collect(),
            details,
        };
        let begun = retry_with_backoff(
            self.store_retry,
            "provider record write",
            RecordStoreError::is_transient,
            || async { self.records.begin_attestation(&draft, self.in_flight_window) },
        )
        .await?;

        let record = match begun {
            BeginOutcome::AlreadyAnchored(record) => {
                tracing::info!(
                    owner = %owner,
                    combined_hash = %record.combined_hash,
                    "Commitment already anchored, skipping ledger"
                );
                return Ok(outcome_of(&record));
            }
            BeginOutcome::Proceed(record) => record,
        };

        self.audit.record(
            AuditEvent::new(AuditEventType::RecordPersisted)
                .with_user(owner.as_str())
                .with_resource("provider", record.id.to_string())
                .with_details(serde_json::json!({
                    "combined_hash": record.combined_hash,
                    "document_count": record.document_count,
                })),
        );

        // (b) ledger
        let reference = match self.ledger.submit(commitment).await {
            Ok(reference) => reference,
            Err(e) => {
                let retryable = e.is_retryable();
                tracing::warn!(
                    owner = %owner,
                    error = %e,
                    retryable,
                    "Ledger submission failed"
                );
                let reason = e.to_string();
                if let Err(mark_err) = retry_with_backoff(
                    self.store_retry,
                    "attestation failure marker",
                    RecordStoreError::is_transient,
                    || async { self.records.mark_attestation_failed(owner, &reason, retryable) },
                )
                .await
                {
                    // The stale `submitting` marker expires after the in-flight window.
                    tracing::error!(
                        owner = %owner,
                        error = %mark_err,
                        "Failed to record attestation failure"
                    );
                }
                self.audit.record(
                    AuditEvent::new(AuditEventType::AttestationFailed)
                        .with_user(owner.as_str())
                        .with_resource("provider", record.id.to_string())
                        .with_details(serde_json::json!({ "retryable": retryable }))
                        .failed(reason),
                );
                return Err(e.into());
            }
        };

        // (c) reference
        self.record_reference(
            owner,
            UnrecordedAnchor {
                combined_hash: commitment.combined_hash.clone(),
                record_id: record.id,
                reference,
            },
        )
        .await
    }

    /// Attach a confirmed ledger reference to the owner's record.
    async fn record_reference(
        &self,
        owner: &OwnerIdentity,
        anchor: UnrecordedAnchor,
    ) -> Result<SubmissionOutcome, PipelineError> {
        let reference = &anchor.reference;
        match retry_with_backoff(
            self.store_retry,
            "ledger reference write",
            RecordStoreError::is_transient,
            || async { self.records.mark_anchored(owner, reference) },
        )
        .await
        {
            Ok(record) => {
                tracing::info!(
                    owner = %owner,
                    transaction = %reference.transaction,
                    block_number = ?reference.block_number,
                    "Provider attestation anchored"
                );
                self.audit.record(
                    AuditEvent::new(AuditEventType::LedgerAnchored)
                        .with_user(owner.as_str())
                        .with_resource("provider", record.id.to_string())
                        .with_details(serde_json::json!({
                            "transaction": reference.transaction,
                            "block_number": reference.block_number,
                        })),
                );
                Ok(outcome_of(&record))
            }
            Err(e) => {
                tracing::error!(
                    owner = %owner,
                    transaction = %reference.transaction,
                    error = %e,
                    "Ledger confirmed commitment but the record update failed"
                );
                let reason = format!(
                    "ledger confirmed transaction {} but the record update failed: {e}",
                    reference.transaction
                );
                // Clears the in-flight marker so the retry is not refused.
                if let Err(mark_err) = self.records.mark_attestation_failed(owner, &reason, true) {
                    tracing::error!(
                        owner = %owner,
                        error = %mark_err,
                        "Failed to record attestation failure"
                    );
                }
                self.audit.record(
                    AuditEvent::new(AuditEventType::AttestationFailed)
                        .with_user(owner.as_str())
                        .with_resource("provider", anchor.record_id.to_string())
                        .with_details(serde_json::json!({
                            "transaction": reference.transaction,
                            "retryable": true,
                        }))
                        .failed(e.to_string()),
                );
                self.hold_unrecorded(owner, anchor);
                Err(PipelineError::RetryableFailure(reason))
            }
        }
    }

    /// Remove the held reference for `owner`; only returned when it was
    /// confirmed for `combined_hash`.
    fn take_unrecorded(
        &self,
        owner: &OwnerIdentity,
        combined_hash: &str,
    ) -> Option<UnrecordedAnchor> {
        let mut held = self.unrecorded.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(owner).filter(|anchor| anchor.combined_hash == combined_hash)
    }

    fn hold_unrecorded(&self, owner: &OwnerIdentity, anchor: UnrecordedAnchor) {
        let mut held = self.unrecorded.lock().unwrap_or_else(|e| e.into_inner());
        held.insert(owner.clone(), anchor);
    }
}

pub(crate) fn outcome_of(record: &ProviderRecord) -> SubmissionOutcome {
    SubmissionOutcome {
        record_id: record.id,
        owner_identity: record.owner_identity.clone(),
        status: record.status,
        ledger_reference: record.ledger_reference.clone(),
        combined_hash: record.combined_hash.clone(),
        document_count: record.document_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use crate::models::{AttestationMarker, OwnerIdentity, ProviderStatus};
    use crate::pipeline::composer::{compose, content_hash};
    use crate::pipeline::test_support::{
        descriptor, fast_adapter, FailingRecordStore, ScriptedLedger,
    };
    use crate::storage::StoragePaths;
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    struct Harness {
        _dir: tempfile::TempDir,
        ledger: Arc<ScriptedLedger>,
        store: Arc<FailingRecordStore>,
        coordinator: PersistenceCoordinator,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(ScriptedLedger::new());
        let store = Arc::new(FailingRecordStore::open(dir.path()));
        let coordinator = PersistenceCoordinator::new(
            store.clone(),
            fast_adapter(ledger.clone()),
            Arc::new(AuditLog::new(StoragePaths::new(dir.path()))),
            RetryPolicy::new(3, std::time::Duration::from_millis(1)),
            chrono::Duration::seconds(5),
        );
        Harness {
            _dir: dir,
            ledger,
            store,
            coordinator,
        }
    }

    fn owner() -> OwnerIdentity {
        OwnerIdentity::parse("owner-1").unwrap()
    }

    fn inputs(payloads: &[&[u8]]) -> (AttestationCommitment, Vec<DocumentDescriptor>) {
        let docs: Vec<_> = payloads.iter().map(|p| descriptor(p)).collect();
        (compose(&owner(), &docs, Utc::now()).unwrap(), docs)
    }

    #[tokio::test]
    async fn happy_path_anchors_pending_record() {
        let h = harness();
        let (commitment, docs) = inputs(&[b"a", b"b"]);

        let outcome = h.coordinator.persist(&commitment, &docs, None).await.unwrap();
        assert_eq!(outcome.status, ProviderStatus::Pending);
        assert!(outcome.ledger_reference.is_some());
        assert_eq!(outcome.combined_hash, commitment.combined_hash);

        let record = h.store.get(&owner()).unwrap().unwrap();
        assert_eq!(record.attestation, AttestationMarker::Anchored);
        assert_eq!(record.documents.len(), 2);

        let entries = h.ledger.inner.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, commitment.to_payload().unwrap());
    }

    #[tokio::test]
    async fn record_write_failure_never_calls_ledger() {
        let h = harness();
        h.store.fail_begin.store(u32::MAX, Ordering::SeqCst);
        let (commitment, docs) = inputs(&[b"a"]);

        let err = h.coordinator.persist(&commitment, &docs, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::RetryableFailure(_)));
        assert_eq!(h.ledger.submit_calls.load(Ordering::SeqCst), 0);
        assert!(h.store.get(&owner()).unwrap().is_none());
    }

    #[tokio::test]
    async fn transient_record_write_failure_is_retried() {
        let h = harness();
        h.store.fail_begin.store(2, Ordering::SeqCst);
        let (commitment, docs) = inputs(&[b"a"]);

        h.coordinator.persist(&commitment, &docs, None).await.unwrap();
        assert_eq!(h.ledger.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ledger_failure_leaves_unanchored_record_then_retry_anchors() {
        let h = harness();
        h.ledger.fail_next(LedgerError::InsufficientResources("fees".into()));
        let (commitment, docs) = inputs(&[b"a", b"b"]);

        let err = h.coordinator.persist(&commitment, &docs, None).await.unwrap_err();
        assert!(err.is_retryable());

        let failed = h.store.get(&owner()).unwrap().unwrap();
        assert!(failed.ledger_reference.is_none());
        assert!(matches!(
            failed.attestation,
            AttestationMarker::Failed { retryable: true, .. }
        ));

        let outcome = h.coordinator.persist(&commitment, &docs, None).await.unwrap();
        assert!(outcome.ledger_reference.is_some());

        let anchored = h.store.get(&owner()).unwrap().unwrap();
        assert_eq!(anchored.documents, failed.documents);
        assert_eq!(anchored.id, failed.id);
        assert_eq!(anchored.status, ProviderStatus::Pending);
    }

    #[tokio::test]
    async fn rejection_marks_record_non_retryable() {
        let h = harness();
        h.ledger.fail_next(LedgerError::Rejected("malformed".into()));
        let (commitment, docs) = inputs(&[b"a"]);

        let err = h.coordinator.persist(&commitment, &docs, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::LedgerRejected(_)));

        let record = h.store.get(&owner()).unwrap().unwrap();
        assert!(matches!(
            record.attestation,
            AttestationMarker::Failed { retryable: false, .. }
        ));
    }

    #[tokio::test]
    async fn anchored_record_short_circuits_second_submit() {
        let h = harness();
        let (commitment, docs) = inputs(&[b"a"]);

        let first = h.coordinator.persist(&commitment, &docs, None).await.unwrap();
        let second = h.coordinator.persist(&commitment, &docs, None).await.unwrap();

        assert_eq!(first.ledger_reference, second.ledger_reference);
        assert_eq!(h.ledger.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn anchored_record_rejects_different_document_set() {
        let h = harness();
        let (commitment, docs) = inputs(&[b"a"]);
        h.coordinator.persist(&commitment, &docs, None).await.unwrap();

        let (other, other_docs) = inputs(&[b"a", b"c"]);
        let err = h.coordinator.persist(&other, &other_docs, None).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Consistency(crate::pipeline::ConsistencyError::AlreadyAttested)
        ));
        assert_eq!(h.ledger.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reference_write_failure_is_retryable_and_logged() {
        let h = harness();
        h.store.fail_anchor.store(u32::MAX, Ordering::SeqCst);
        let (commitment, docs) = inputs(&[b"a"]);

        let err = h.coordinator.persist(&commitment, &docs, None).await.unwrap_err();
        let PipelineError::RetryableFailure(message) = err else {
            panic!("expected retryable failure");
        };
        let transaction = &h.ledger.inner.entries()[0].transaction;
        assert!(message.contains(transaction.as_str()));

        let record = h.store.get(&owner()).unwrap().unwrap();
        assert!(record.ledger_reference.is_none());
        assert!(matches!(
            record.attestation,
            AttestationMarker::Failed { retryable: true, .. }
        ));
    }

    #[tokio::test]
    async fn retry_after_reference_write_failure_reuses_confirmed_transaction() {
        let h = harness();
        h.store.fail_anchor.store(u32::MAX, Ordering::SeqCst);
        let (commitment, docs) = inputs(&[b"a", b"b"]);

        h.coordinator.persist(&commitment, &docs, None).await.unwrap_err();
        h.store.fail_anchor.store(0, Ordering::SeqCst);

        // Immediately, well inside the in-flight window.
        let outcome = h.coordinator.persist(&commitment, &docs, None).await.unwrap();

        let entries = h.ledger.inner.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(h.ledger.submit_calls.load(Ordering::SeqCst), 1);
        let reference = outcome.ledger_reference.unwrap();
        assert_eq!(reference.transaction, entries[0].transaction);

        let record = h.store.get(&owner()).unwrap().unwrap();
        assert_eq!(record.attestation, AttestationMarker::Anchored);
        assert_eq!(record.ledger_reference, Some(reference));
    }

    #[tokio::test]
    async fn held_reference_is_dropped_when_documents_change() {
        let h = harness();
        h.store.fail_anchor.store(u32::MAX, Ordering::SeqCst);
        let (commitment, docs) = inputs(&[b"a"]);
        h.coordinator.persist(&commitment, &docs, None).await.unwrap_err();
        h.store.fail_anchor.store(0, Ordering::SeqCst);

        let (other, other_docs) = inputs(&[b"a", b"c"]);
        let outcome = h.coordinator.persist(&other, &other_docs, None).await.unwrap();
        assert_eq!(outcome.combined_hash, other.combined_hash);
        assert_eq!(h.ledger.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn outcome_mirrors_record() {
        let docs = [descriptor(b"x")];
        let record = ProviderRecord {
            id: uuid::Uuid::new_v4(),
            owner_identity: owner(),
            status: ProviderStatus::Verified,
            ledger_reference: None,
            attestation: AttestationMarker::Unanchored,
            combined_hash: content_hash(b"x"),
            document_count: 1,
            documents: docs.iter().map(DocumentMetadata::from).collect(),
            details: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let outcome = outcome_of(&record);
        assert_eq!(outcome.record_id, record.id);
        assert_eq!(outcome.status, ProviderStatus::Verified);
    }
}
