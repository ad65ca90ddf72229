// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Provider Verification Pipeline
//!
//! ```text
//! upload ─▶ DocumentIntake ─▶ VerificationSession ─▶ compose ─▶ PersistenceCoordinator
//!           (hash + blob)      (required set)        (commitment)  (record ▸ ledger ▸ record)
//! ```
//!
//! [`AttestationPipeline`] is the boundary used by the HTTP layer. Every
//! operation takes an explicit [`IdentityContext`]. Session locks are never
//! held across blob or ledger I/O.

pub mod composer;
pub mod coordinator;
pub mod error;
pub mod intake;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

pub use composer::{combined_hash, compose, content_hash, verify, AttestationCommitment};
pub use coordinator::PersistenceCoordinator;
pub use error::{ConsistencyError, PipelineError, ValidationError};
pub use intake::{DocumentIntake, Upload, MAX_DOCUMENT_BYTES};
pub use session::{
    SessionRegistry, SessionState, SubmissionOutcome, SubmitStart, VerificationSession,
};

use crate::auth::IdentityContext;
use crate::models::{
    DocumentDescriptor, DocumentType, OwnerIdentity, ProfileRole, ProviderDetails, ProviderRecord,
    ProviderStatus,
};
use crate::storage::{AuditEvent, AuditEventType, AuditLog, RecordStore};
use session::{SessionError, SessionHandle};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

pub struct AttestationPipeline {
    sessions: SessionRegistry,
    intake: DocumentIntake,
    coordinator: PersistenceCoordinator,
    records: Arc<dyn RecordStore>,
    audit: Arc<AuditLog>,
}

impl AttestationPipeline {
    pub fn new(
        sessions: SessionRegistry,
        intake: DocumentIntake,
        coordinator: PersistenceCoordinator,
        records: Arc<dyn RecordStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            sessions,
            intake,
            coordinator,
            records,
            audit,
        }
    }

    pub fn required_document_types(&self) -> &BTreeSet<DocumentType> {
        self.sessions.required_document_types()
    }

    pub fn max_document_bytes(&self) -> usize {
        self.intake.max_bytes()
    }

    pub fn ledger_backend(&self) -> &'static str {
        self.coordinator.ledger().backend()
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Start onboarding, or resume the caller's open session.
    ///
    /// Returns the session and whether it was newly created.
    pub async fn start_session(
        &self,
        identity: &IdentityContext,
    ) -> Result<(VerificationSession, bool), PipelineError> {
        if identity.profile == ProfileRole::BuyerProfile {
            return Err(ConsistencyError::ProfileConflict(
                "identity already holds a buyer profile".to_string(),
            )
            .into());
        }

        let (handle, created) = self.sessions.start(&identity.owner).await;
        let session = handle.lock().await.clone();

        if created {
            tracing::info!(
                owner = %identity.owner,
                session_id = %session.id,
                required = session.required_document_types.len(),
                "Verification session started"
            );
            self.audit.record(
                AuditEvent::new(AuditEventType::SessionStarted)
                    .with_user(identity.owner.as_str())
                    .with_resource("session", session.id.to_string()),
            );
        }
        Ok((session, created))
    }

    pub async fn get_session(
        &self,
        identity: &IdentityContext,
        session_id: Uuid,
    ) -> Result<VerificationSession, PipelineError> {
        let handle = self.handle(session_id)?;
        let session = handle.lock().await;
        ensure_access(identity, &session, Access::Read)?;
        Ok(session.clone())
    }

    pub async fn set_details(
        &self,
        identity: &IdentityContext,
        session_id: Uuid,
        details: ProviderDetails,
    ) -> Result<VerificationSession, PipelineError> {
        details.validate().map_err(ValidationError::InvalidDetails)?;

        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        ensure_access(identity, &session, Access::Write)?;
        session.set_details(details)?;

        self.audit.record(
            AuditEvent::new(AuditEventType::DetailsUpdated)
                .with_user(identity.owner.as_str())
                .with_resource("session", session_id.to_string()),
        );
        Ok(session.clone())
    }

    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------

    /// Ingest one document into a session.
    ///
    /// Returns the descriptor and whether it was added; re-uploading identical
    /// content under the same type returns the existing descriptor.
    pub async fn upload_document(
        &self,
        identity: &IdentityContext,
        session_id: Uuid,
        upload: Upload<'_>,
    ) -> Result<(DocumentDescriptor, bool), PipelineError> {
        let handle = self.handle(session_id)?;
        {
            let session = handle.lock().await;
            ensure_access(identity, &session, Access::Write)?;
            if !session.state.accepts_changes() {
                return Err(SessionError::InvalidState {
                    state: session.state,
                    operation: "upload documents",
                }
                .into());
            }
        }

        let descriptor = match self.intake.ingest(&identity.owner, upload).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let err = PipelineError::from(e);
                if matches!(err, PipelineError::RetryableFailure(_) | PipelineError::Storage(_)) {
                    tracing::warn!(
                        owner = %identity.owner,
                        session_id = %session_id,
                        error = %err,
                        "Document storage failed"
                    );
                    handle
                        .lock()
                        .await
                        .record_failure(err.to_string(), err.is_retryable());
                }
                return Err(err);
            }
        };

        let (descriptor, added) = handle.lock().await.add_document(descriptor)?;
        if added {
            self.audit.record(
                AuditEvent::new(AuditEventType::DocumentIngested)
                    .with_user(identity.owner.as_str())
                    .with_resource("document", descriptor.id.to_string())
                    .with_details(serde_json::json!({
                        "session_id": session_id,
                        "document_type": descriptor.document_type,
                        "content_hash": descriptor.content_hash,
                        "size_bytes": descriptor.size_bytes,
                    })),
            );
        }
        Ok((descriptor, added))
    }

    /// Drop a document from the session. The blob is kept.
    pub async fn remove_document(
        &self,
        identity: &IdentityContext,
        session_id: Uuid,
        document_id: Uuid,
    ) -> Result<VerificationSession, PipelineError> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        ensure_access(identity, &session, Access::Write)?;
        let removed = session.remove_document(document_id)?;

        self.audit.record(
            AuditEvent::new(AuditEventType::DocumentRemoved)
                .with_user(identity.owner.as_str())
                .with_resource("document", removed.id.to_string())
                .with_details(serde_json::json!({
                    "session_id": session_id,
                    "content_hash": removed.content_hash,
                })),
        );
        Ok(session.clone())
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Compose the commitment and run the persistence saga.
    ///
    /// At most one submission per session is in flight; a concurrent call
    /// fails with [`ConsistencyError::SubmitInFlight`]. Submitting an attested
    /// session returns the stored outcome without touching the ledger.
    pub async fn submit(
        &self,
        identity: &IdentityContext,
        session_id: Uuid,
    ) -> Result<SubmissionOutcome, PipelineError> {
        let handle = self.handle(session_id)?;
        let (token, documents, details) = {
            let mut session = handle.lock().await;
            ensure_access(identity, &session, Access::Write)?;
            match session.begin_submit()? {
                SubmitStart::Done(outcome) => return Ok(outcome),
                SubmitStart::Begin(token) => (
                    token,
                    session.collected_documents.clone(),
                    session.details.clone(),
                ),
            }
        };

        self.audit.record(
            AuditEvent::new(AuditEventType::SubmissionStarted)
                .with_user(identity.owner.as_str())
                .with_resource("session", session_id.to_string())
                .with_details(serde_json::json!({ "document_count": documents.len() })),
        );

        let result = self
            .run_submission(&identity.owner, &documents, details)
            .await;

        let mut session = handle.lock().await;
        match result {
            Ok(outcome) => {
                session.complete(token, outcome.clone())?;
                tracing::info!(
                    owner = %identity.owner,
                    session_id = %session_id,
                    record_id = %outcome.record_id,
                    "Session attested"
                );
                Ok(outcome)
            }
            Err(e) => {
                let retryable = e.is_retryable();
                session.fail(token, e.to_string(), retryable)?;
                tracing::warn!(
                    owner = %identity.owner,
                    session_id = %session_id,
                    error = %e,
                    retryable,
                    "Submission failed"
                );
                Err(e)
            }
        }
    }

    async fn run_submission(
        &self,
        owner: &OwnerIdentity,
        documents: &[DocumentDescriptor],
        details: Option<ProviderDetails>,
    ) -> Result<SubmissionOutcome, PipelineError> {
        let commitment = compose(owner, documents, Utc::now())
            .map_err(|e| ValidationError::InvalidInput(e.to_string()))?;
        self.coordinator.persist(&commitment, documents, details).await
    }

    // -------------------------------------------------------------------------
    // Records
    // -------------------------------------------------------------------------

    pub fn get_provider_record(
        &self,
        identity: &IdentityContext,
        owner: &OwnerIdentity,
    ) -> Result<ProviderRecord, PipelineError> {
        if !identity.can_access(owner) {
            return Err(PipelineError::Forbidden(
                "provider records are visible to their owner and reviewers".to_string(),
            ));
        }
        self.records
            .get(owner)?
            .ok_or_else(|| PipelineError::RecordNotFound(owner.to_string()))
    }

    /// Manual review transition. Reviewer or admin only.
    pub fn review_provider(
        &self,
        identity: &IdentityContext,
        owner: &OwnerIdentity,
        next: ProviderStatus,
    ) -> Result<ProviderRecord, PipelineError> {
        if !identity.can_review() {
            return Err(PipelineError::Forbidden(
                "reviewer role required".to_string(),
            ));
        }

        let record = self.records.set_review_status(owner, next)?;
        tracing::info!(
            owner = %owner,
            reviewer = %identity.owner,
            status = %record.status,
            "Provider review status changed"
        );
        self.audit.record(
            AuditEvent::new(AuditEventType::ReviewStatusChanged)
                .with_user(identity.owner.as_str())
                .with_resource("provider", record.id.to_string())
                .with_details(serde_json::json!({
                    "owner": owner,
                    "status": record.status,
                })),
        );
        Ok(record)
    }

    fn handle(&self, session_id: Uuid) -> Result<SessionHandle, PipelineError> {
        self.sessions
            .get(session_id)
            .ok_or(PipelineError::SessionNotFound(session_id))
    }
}

fn ensure_access(
    identity: &IdentityContext,
    session: &VerificationSession,
    access: Access,
) -> Result<(), PipelineError> {
    let allowed = match access {
        Access::Read => identity.can_access(&session.owner_identity),
        Access::Write => identity.owner == session.owner_identity,
    };
    if allowed {
        Ok(())
    } else {
        tracing::warn!(
            caller = %identity.owner,
            session_id = %session.id,
            "Session ownership mismatch"
        );
        Err(ConsistencyError::OwnershipMismatch.into())
    }
}
