// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verification Session State Machine
//!
//! Tracks one onboarding attempt from first upload to attestation.
//!
//! ## States
//!
//! ```text
//! Draft ──▶ Collecting ⇄ ReadyToSubmit ──▶ Submitting ──▶ Attested
//!                ▲              ▲               │
//!                │              │               └──▶ Failed { retryable }
//!                └──────────────┴── (upload/remove while retryable) ◀──┘
//! ```
//!
//! `Submitting` is entered under a fresh idempotency token; only the holder of
//! that token can complete or fail the submission. A permanent failure
//! (`retryable: false`) is terminal. Collected documents are never dropped by
//! a failure.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{
    DocumentDescriptor, DocumentType, LedgerReference, OwnerIdentity, ProviderDetails,
    ProviderStatus,
};

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Started, nothing uploaded yet
    Draft,
    /// Some documents collected, required set incomplete
    Collecting,
    /// Required set complete
    ReadyToSubmit,
    /// Persistence saga in progress
    Submitting,
    /// Record written and ledger reference confirmed
    Attested,
    /// Last submission failed
    Failed { retryable: bool },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Attested | Self::Failed { retryable: false })
    }

    /// Whether documents and details may still change.
    pub fn accepts_changes(&self) -> bool {
        matches!(
            self,
            Self::Draft | Self::Collecting | Self::ReadyToSubmit | Self::Failed { retryable: true }
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Collecting => "collecting",
            Self::ReadyToSubmit => "ready_to_submit",
            Self::Submitting => "submitting",
            Self::Attested => "attested",
            Self::Failed { retryable: true } => "failed (retryable)",
            Self::Failed { retryable: false } => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("missing required documents: {0:?}")]
    MissingDocuments(Vec<DocumentType>),

    #[error("a submission is already in flight")]
    SubmitInFlight,

    #[error("session is {state}; cannot {operation}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    #[error("submission token does not match the in-flight submission")]
    StaleToken,

    #[error("document {0} not found in session")]
    DocumentNotFound(Uuid),
}

// =============================================================================
// Outcome & Failure
// =============================================================================

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubmissionOutcome {
    pub record_id: Uuid,
    pub owner_identity: OwnerIdentity,
    pub status: ProviderStatus,
    pub ledger_reference: Option<LedgerReference>,
    pub combined_hash: String,
    pub document_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionFailure {
    pub reason: String,
    pub retryable: bool,
    pub at: DateTime<Utc>,
}

/// What [`VerificationSession::begin_submit`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStart {
    /// Entered `Submitting`; the token must be presented to finish.
    Begin(Uuid),
    /// Already attested; the stored outcome is returned as-is.
    Done(SubmissionOutcome),
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VerificationSession {
    pub id: Uuid,
    pub owner_identity: OwnerIdentity,
    pub required_document_types: BTreeSet<DocumentType>,
    /// In upload order
    pub collected_documents: Vec<DocumentDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ProviderDetails>,
    #[serde(flatten)]
    pub state: SessionState,
    #[serde(skip)]
    submit_token: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<SessionFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SubmissionOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationSession {
    pub fn new(owner: OwnerIdentity, required: BTreeSet<DocumentType>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_identity: owner,
            required_document_types: required,
            collected_documents: Vec::new(),
            details: None,
            state: SessionState::Draft,
            submit_token: None,
            last_failure: None,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Distinct document types collected so far.
    pub fn collected_types(&self) -> BTreeSet<DocumentType> {
        self.collected_documents
            .iter()
            .map(|d| d.document_type)
            .collect()
    }

    /// Required types not yet collected, in enum order.
    pub fn missing_document_types(&self) -> Vec<DocumentType> {
        let collected = self.collected_types();
        self.required_document_types
            .difference(&collected)
            .copied()
            .collect()
    }

    /// Collected types cover the required set (and at least one document exists).
    pub fn is_complete(&self) -> bool {
        !self.collected_documents.is_empty()
            && self.required_document_types.is_subset(&self.collected_types())
    }

    fn ensure_accepts_changes(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state.accepts_changes() {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    /// Re-derive the collection state after the document set changed.
    fn reevaluate(&mut self) {
        self.state = if self.is_complete() {
            SessionState::ReadyToSubmit
        } else if self.state == SessionState::Draft && self.collected_documents.is_empty() {
            SessionState::Draft
        } else {
            SessionState::Collecting
        };
        self.updated_at = Utc::now();
    }

    /// Add a stored document.
    ///
    /// The same content uploaded again under the same type is coalesced: the
    /// existing descriptor is returned and `false` signals nothing was added.
    pub fn add_document(
        &mut self,
        descriptor: DocumentDescriptor,
    ) -> Result<(DocumentDescriptor, bool), SessionError> {
        self.ensure_accepts_changes("upload documents")?;

        if let Some(existing) = self.collected_documents.iter().find(|d| {
            d.content_hash == descriptor.content_hash && d.document_type == descriptor.document_type
        }) {
            return Ok((existing.clone(), false));
        }

        self.collected_documents.push(descriptor.clone());
        self.reevaluate();
        Ok((descriptor, true))
    }

    pub fn remove_document(
        &mut self,
        document_id: Uuid,
    ) -> Result<DocumentDescriptor, SessionError> {
        self.ensure_accepts_changes("remove documents")?;

        let index = self
            .collected_documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or(SessionError::DocumentNotFound(document_id))?;
        let removed = self.collected_documents.remove(index);
        self.reevaluate();
        Ok(removed)
    }

    pub fn set_details(&mut self, details: ProviderDetails) -> Result<(), SessionError> {
        self.ensure_accepts_changes("update details")?;
        self.details = Some(details);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check only: fails unless the state would allow a submission.
    pub fn ensure_can_submit(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Attested => Ok(()),
            SessionState::Submitting => Err(SessionError::SubmitInFlight),
            state @ SessionState::Failed { retryable: false } => Err(SessionError::InvalidState {
                state,
                operation: "submit",
            }),
            _ if !self.is_complete() => {
                let mut missing = self.missing_document_types();
                if missing.is_empty() {
                    // Empty required set but nothing uploaded.
                    missing = DocumentType::ALL.to_vec();
                }
                Err(SessionError::MissingDocuments(missing))
            }
            _ => Ok(()),
        }
    }

    /// Enter `Submitting` at most once per attempt.
    pub fn begin_submit(&mut self) -> Result<SubmitStart, SessionError> {
        self.ensure_can_submit()?;
        if self.state == SessionState::Attested {
            if let Some(outcome) = &self.outcome {
                return Ok(SubmitStart::Done(outcome.clone()));
            }
        }

        let token = Uuid::new_v4();
        self.submit_token = Some(token);
        self.state = SessionState::Submitting;
        self.updated_at = Utc::now();
        Ok(SubmitStart::Begin(token))
    }

    fn take_token(&mut self, token: Uuid) -> Result<(), SessionError> {
        if self.state != SessionState::Submitting || self.submit_token != Some(token) {
            return Err(SessionError::StaleToken);
        }
        self.submit_token = None;
        Ok(())
    }

    pub fn complete(
        &mut self,
        token: Uuid,
        outcome: SubmissionOutcome,
    ) -> Result<(), SessionError> {
        self.take_token(token)?;
        self.state = SessionState::Attested;
        self.outcome = Some(outcome);
        self.last_failure = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Leave `Submitting` after a failure. Documents are kept.
    pub fn fail(
        &mut self,
        token: Uuid,
        reason: String,
        retryable: bool,
    ) -> Result<(), SessionError> {
        self.take_token(token)?;
        self.state = SessionState::Failed { retryable };
        self.record_failure(reason, retryable);
        Ok(())
    }

    /// Note a failure that did not change the state (e.g. a blob outage).
    pub fn record_failure(&mut self, reason: String, retryable: bool) {
        self.last_failure = Some(SessionFailure {
            reason,
            retryable,
            at: Utc::now(),
        });
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Registry
// =============================================================================

pub type SessionHandle = Arc<Mutex<VerificationSession>>;

/// Sessions untouched for this long are dropped from the registry.
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<Uuid, SessionHandle>,
    open_by_owner: HashMap<OwnerIdentity, Uuid>,
}

impl RegistryInner {
    /// Drop idle sessions. Sessions that are locked or mid-submission stay.
    fn evict_idle(&mut self, cutoff: DateTime<Utc>) -> usize {
        let idle: Vec<(Uuid, OwnerIdentity)> = self
            .by_id
            .iter()
            .filter_map(|(id, handle)| {
                let session = handle.try_lock().ok()?;
                (session.state != SessionState::Submitting && session.updated_at < cutoff)
                    .then(|| (*id, session.owner_identity.clone()))
            })
            .collect();

        for (id, owner) in &idle {
            self.by_id.remove(id);
            if self.open_by_owner.get(owner) == Some(id) {
                self.open_by_owner.remove(owner);
            }
        }
        idle.len()
    }
}

/// In-process registry of live sessions.
///
/// Holds at most one session per owner: a finished session is dropped when
/// its successor starts, and idle sessions are evicted once they outlive the
/// idle TTL. The registry lock only guards the maps; each session has its own
/// async mutex, held for state transitions and never across blob or ledger I/O.
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    required: BTreeSet<DocumentType>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(required: BTreeSet<DocumentType>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            required,
            idle_ttl: DEFAULT_SESSION_IDLE_TTL,
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn required_document_types(&self) -> &BTreeSet<DocumentType> {
        &self.required
    }

    /// Resume the owner's open session, or start a new one.
    ///
    /// Returns the handle and whether it was newly created. Sessions that are
    /// attested or permanently failed are superseded by a fresh one and
    /// removed; their ids stop resolving.
    pub async fn start(&self, owner: &OwnerIdentity) -> (SessionHandle, bool) {
        let existing = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            inner
                .open_by_owner
                .get(owner)
                .and_then(|id| inner.by_id.get(id).map(|handle| (*id, handle.clone())))
        };
        let mut superseded = None;
        if let Some((id, handle)) = existing {
            let mut session = handle.lock().await;
            if !session.state.is_terminal() {
                // Resuming counts as activity.
                session.updated_at = Utc::now();
                drop(session);
                return (handle, false);
            }
            superseded = Some(id);
        }

        let session = VerificationSession::new(owner.clone(), self.required.clone());
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // Another request may have raced us to replace it.
        let current = inner.open_by_owner.get(owner).copied();
        if current.is_some() && current != superseded {
            if let Some(winner) = current.and_then(|id| inner.by_id.get(&id)) {
                return (winner.clone(), false);
            }
        }
        // Terminal states never transition again, so the old session can go.
        if let Some(old) = superseded {
            inner.by_id.remove(&old);
        }

        if let Ok(idle_ttl) = chrono::Duration::from_std(self.idle_ttl) {
            let evicted = inner.evict_idle(Utc::now() - idle_ttl);
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted idle verification sessions");
            }
        }

        inner.by_id.insert(id, handle.clone());
        inner.open_by_owner.insert(owner.clone(), id);
        (handle, true)
    }

    pub fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.by_id.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentFormat;

    fn owner() -> OwnerIdentity {
        OwnerIdentity::parse("owner-1").unwrap()
    }

    fn doc(document_type: DocumentType, hash: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            id: Uuid::new_v4(),
            document_type,
            display_name: format!("{document_type}.pdf"),
            content_hash: hash.to_string(),
            storage_locator: format!("file:///blobs/{hash}.pdf"),
            content_format: ContentFormat::Pdf,
            size_bytes: 10,
            uploaded_at: Utc::now(),
            metadata: Default::default(),
        }
    }

    fn required(types: &[DocumentType]) -> BTreeSet<DocumentType> {
        types.iter().copied().collect()
    }

    fn outcome() -> SubmissionOutcome {
        SubmissionOutcome {
            record_id: Uuid::new_v4(),
            owner_identity: owner(),
            status: ProviderStatus::Pending,
            ledger_reference: None,
            combined_hash: "c".to_string(),
            document_count: 1,
        }
    }

    #[test]
    fn new_session_is_draft() {
        let s = VerificationSession::new(owner(), DocumentType::default_required());
        assert_eq!(s.state, SessionState::Draft);
        assert_eq!(s.missing_document_types().len(), 4);
    }

    #[test]
    fn ready_iff_collected_covers_required_for_every_subset() {
        let all = DocumentType::default_required().into_iter().collect::<Vec<_>>();
        // Every subset of the required set, by bitmask.
        for mask in 0u32..(1 << all.len()) {
            let mut s = VerificationSession::new(owner(), required(&all));
            for (i, t) in all.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    s.add_document(doc(*t, &format!("h{i}"))).unwrap();
                }
            }
            // Extra, non-required documents never complete the set.
            s.add_document(doc(DocumentType::ExportLicense, "extra")).unwrap();

            let complete = mask == (1 << all.len()) - 1;
            assert_eq!(s.state == SessionState::ReadyToSubmit, complete, "mask {mask:b}");
            assert_eq!(s.is_complete(), complete);
        }
    }

    #[test]
    fn removal_reverts_readiness() {
        let mut s = VerificationSession::new(owner(), required(&[DocumentType::TaxCertificate]));
        let (d, added) = s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
        assert!(added);
        assert_eq!(s.state, SessionState::ReadyToSubmit);

        s.remove_document(d.id).unwrap();
        assert_eq!(s.state, SessionState::Collecting);

        s.add_document(doc(DocumentType::BankStatement, "h2")).unwrap();
        assert_eq!(s.state, SessionState::Collecting);

        let unknown = Uuid::new_v4();
        assert_eq!(
            s.remove_document(unknown).unwrap_err(),
            SessionError::DocumentNotFound(unknown)
        );
        assert_eq!(s.collected_documents.len(), 1);
    }

    #[test]
    fn duplicate_upload_is_coalesced() {
        let mut s = VerificationSession::new(owner(), required(&[DocumentType::TaxCertificate]));
        let (first, added) = s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
        assert!(added);
        let (second, added_again) = s
            .add_document(doc(DocumentType::TaxCertificate, "h1"))
            .unwrap();
        assert!(!added_again);
        assert_eq!(first.id, second.id);
        assert_eq!(s.collected_documents.len(), 1);
    }

    #[test]
    fn submit_before_complete_keeps_collecting() {
        let mut s = VerificationSession::new(
            owner(),
            required(&[DocumentType::TaxCertificate, DocumentType::BankStatement]),
        );
        s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();

        let err = s.begin_submit().unwrap_err();
        assert_eq!(
            err,
            SessionError::MissingDocuments(vec![DocumentType::BankStatement])
        );
        assert_eq!(s.state, SessionState::Collecting);
    }

    #[test]
    fn empty_required_set_still_needs_a_document() {
        let mut s = VerificationSession::new(owner(), BTreeSet::new());
        assert!(matches!(
            s.begin_submit().unwrap_err(),
            SessionError::MissingDocuments(_)
        ));
    }

    #[test]
    fn submitting_is_entered_once() {
        let mut s = VerificationSession::new(owner(), required(&[DocumentType::TaxCertificate]));
        s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();

        let SubmitStart::Begin(token) = s.begin_submit().unwrap() else {
            panic!("expected begin");
        };
        assert_eq!(s.begin_submit().unwrap_err(), SessionError::SubmitInFlight);
        assert!(matches!(
            s.add_document(doc(DocumentType::BankStatement, "h2")).unwrap_err(),
            SessionError::InvalidState { .. }
        ));

        s.complete(token, outcome()).unwrap();
        assert_eq!(s.state, SessionState::Attested);
        assert!(matches!(s.begin_submit().unwrap(), SubmitStart::Done(_)));
    }

    #[test]
    fn stale_token_cannot_finish() {
        let mut s = VerificationSession::new(owner(), required(&[DocumentType::TaxCertificate]));
        s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
        s.begin_submit().unwrap();

        assert_eq!(
            s.complete(Uuid::new_v4(), outcome()).unwrap_err(),
            SessionError::StaleToken
        );
        assert_eq!(s.state, SessionState::Submitting);
    }

    #[test]
    fn retryable_failure_keeps_documents_and_allows_resubmit() {
        let mut s = VerificationSession::new(owner(), required(&[DocumentType::TaxCertificate]));
        s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
        let SubmitStart::Begin(token) = s.begin_submit().unwrap() else {
            panic!("expected begin");
        };

        s.fail(token, "ledger timeout".into(), true).unwrap();
        assert_eq!(s.state, SessionState::Failed { retryable: true });
        assert_eq!(s.collected_documents.len(), 1);
        assert!(s.last_failure.as_ref().unwrap().retryable);

        assert!(matches!(s.begin_submit().unwrap(), SubmitStart::Begin(_)));
    }

    #[test]
    fn permanent_failure_is_terminal() {
        let mut s = VerificationSession::new(owner(), required(&[DocumentType::TaxCertificate]));
        s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
        let SubmitStart::Begin(token) = s.begin_submit().unwrap() else {
            panic!("expected begin");
        };
        s.fail(token, "rejected".into(), false).unwrap();

        assert!(s.state.is_terminal());
        assert!(matches!(
            s.begin_submit().unwrap_err(),
            SessionError::InvalidState { .. }
        ));
        assert!(s.add_document(doc(DocumentType::BankStatement, "h2")).is_err());
        assert_eq!(s.collected_documents.len(), 1);
    }

    #[test]
    fn upload_after_retryable_failure_resumes_collection() {
        let mut s = VerificationSession::new(owner(), required(&[DocumentType::TaxCertificate]));
        s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
        let SubmitStart::Begin(token) = s.begin_submit().unwrap() else {
            panic!("expected begin");
        };
        s.fail(token, "network".into(), true).unwrap();

        s.add_document(doc(DocumentType::ExportLicense, "h2")).unwrap();
        assert_eq!(s.state, SessionState::ReadyToSubmit);
    }

    #[test]
    fn session_serializes_flat_state() {
        let s = VerificationSession::new(owner(), BTreeSet::new());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["state"], "draft");
        assert!(json.get("submit_token").is_none());
    }

    async fn attest(handle: &SessionHandle) {
        let mut s = handle.lock().await;
        s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
        let SubmitStart::Begin(token) = s.begin_submit().unwrap() else {
            panic!("expected begin");
        };
        s.complete(token, outcome()).unwrap();
    }

    #[tokio::test]
    async fn registry_resumes_open_session_and_supersedes_finished_ones() {
        let registry = SessionRegistry::new(required(&[DocumentType::TaxCertificate]));

        let (first, created) = registry.start(&owner()).await;
        assert!(created);
        let (again, created_again) = registry.start(&owner()).await;
        assert!(!created_again);
        assert!(Arc::ptr_eq(&first, &again));

        attest(&first).await;

        let (fresh, created_fresh) = registry.start(&owner()).await;
        assert!(created_fresh);
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(registry.len(), 1);

        let old_id = first.lock().await.id;
        let fresh_id = fresh.lock().await.id;
        assert!(registry.get(old_id).is_none());
        assert!(registry.get(fresh_id).is_some());
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn registry_stays_bounded_across_repeated_attestations() {
        let registry = SessionRegistry::new(required(&[DocumentType::TaxCertificate]));
        let other = OwnerIdentity::parse("owner-2").unwrap();
        registry.start(&other).await;

        for _ in 0..50 {
            let (handle, created) = registry.start(&owner()).await;
            assert!(created);
            attest(&handle).await;
        }
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_but_submitting_ones_stay() {
        let registry = SessionRegistry::new(required(&[DocumentType::TaxCertificate]))
            .with_idle_ttl(Duration::from_secs(60));
        let stale = Utc::now() - chrono::Duration::hours(2);

        let abandoned_owner = OwnerIdentity::parse("abandoned").unwrap();
        let (abandoned, _) = registry.start(&abandoned_owner).await;
        let abandoned_id = {
            let mut s = abandoned.lock().await;
            s.updated_at = stale;
            s.id
        };

        let busy_owner = OwnerIdentity::parse("busy").unwrap();
        let (busy, _) = registry.start(&busy_owner).await;
        let busy_id = {
            let mut s = busy.lock().await;
            s.add_document(doc(DocumentType::TaxCertificate, "h1")).unwrap();
            assert!(matches!(s.begin_submit().unwrap(), SubmitStart::Begin(_)));
            s.updated_at = stale;
            s.id
        };

        registry.start(&owner()).await;

        assert!(registry.get(abandoned_id).is_none());
        assert!(registry.get(busy_id).is_some());
        assert_eq!(registry.len(), 2);

        // The evicted owner gets a fresh session on return.
        let (returned, created) = registry.start(&abandoned_owner).await;
        assert!(created);
        assert_ne!(returned.lock().await.id, abandoned_id);
    }
}
