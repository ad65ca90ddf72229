// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pipeline error taxonomy.
//!
//! Component errors ([`IntakeError`], [`SessionError`], [`RecordStoreError`],
//! [`LedgerError`]) converge here. Callers only need to distinguish four
//! outcomes: fix the input, resolve a conflict, retry later, or give up.

use uuid::Uuid;

use super::intake::IntakeError;
use super::session::SessionError;
use crate::ledger::LedgerError;
use crate::models::DocumentType;
use crate::storage::RecordStoreError;

/// Caller-correctable input problems. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("document is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported document format: {0}")]
    UnsupportedType(String),

    #[error("missing required documents: {}", format_types(.0))]
    MissingDocuments(Vec<DocumentType>),

    #[error("invalid provider details: {0}")]
    InvalidDetails(String),

    #[error("{0}")]
    InvalidInput(String),
}

fn format_types(types: &[DocumentType]) -> String {
    types
        .iter()
        .map(DocumentType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The request conflicts with current session or record state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("a submission is already in flight")]
    SubmitInFlight,

    #[error("session is {state}; cannot {operation}")]
    StaleSession {
        state: String,
        operation: &'static str,
    },

    #[error("provider is already attested with a different document set")]
    AlreadyAttested,

    #[error("session belongs to a different identity")]
    OwnershipMismatch,

    #[error("{0}")]
    ProfileConflict(String),

    #[error("review transition not allowed: {0}")]
    InvalidReview(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("provider record not found: {0}")]
    RecordNotFound(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Permanent storage failure (corruption, permissions, bad layout).
    #[error("storage error: {0}")]
    Storage(String),

    /// Permanent ledger rejection; terminal for the session.
    #[error("ledger rejected the commitment: {0}")]
    LedgerRejected(String),

    /// Transient failure after bounded retries; safe to resubmit.
    #[error("{0}; retry later")]
    RetryableFailure(String),
}

impl PipelineError {
    /// Whether resubmitting the same request can succeed without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::RetryableFailure(_)
                | PipelineError::Consistency(ConsistencyError::SubmitInFlight)
        )
    }
}

impl From<IntakeError> for PipelineError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::Empty => ValidationError::EmptyDocument.into(),
            IntakeError::TooLarge { size, limit } => {
                ValidationError::TooLarge { size, limit }.into()
            }
            IntakeError::UnsupportedType(what) => ValidationError::UnsupportedType(what).into(),
            IntakeError::StorageUnavailable(reason) => {
                PipelineError::RetryableFailure(format!("blob storage unavailable: {reason}"))
            }
            IntakeError::Storage(reason) => PipelineError::Storage(reason),
        }
    }
}

impl From<SessionError> for PipelineError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::MissingDocuments(types) => {
                ValidationError::MissingDocuments(types).into()
            }
            SessionError::SubmitInFlight => ConsistencyError::SubmitInFlight.into(),
            SessionError::InvalidState { state, operation } => ConsistencyError::StaleSession {
                state: state.to_string(),
                operation,
            }
            .into(),
            SessionError::StaleToken => ConsistencyError::StaleSession {
                state: "superseded".to_string(),
                operation: "complete submission",
            }
            .into(),
            SessionError::DocumentNotFound(id) => PipelineError::DocumentNotFound(id),
        }
    }
}

impl From<RecordStoreError> for PipelineError {
    fn from(e: RecordStoreError) -> Self {
        match e {
            RecordStoreError::NotFound(owner) => PipelineError::RecordNotFound(owner),
            RecordStoreError::AlreadyAttested(_) => ConsistencyError::AlreadyAttested.into(),
            RecordStoreError::InFlight(_) => ConsistencyError::SubmitInFlight.into(),
            RecordStoreError::InvalidTransition { from, to, .. } => {
                ConsistencyError::InvalidReview(format!("{from} -> {to}")).into()
            }
            RecordStoreError::NotAnchored(_) => {
                ConsistencyError::InvalidReview("record has no confirmed attestation".to_string())
                    .into()
            }
            other if other.is_transient() => {
                PipelineError::RetryableFailure(format!("record store unavailable: {other}"))
            }
            other => PipelineError::Storage(other.to_string()),
        }
    }
}

impl From<LedgerError> for PipelineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Rejected(reason) => PipelineError::LedgerRejected(reason),
            other => PipelineError::RetryableFailure(other.to_string()),
        }
    }
}
