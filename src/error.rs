// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::pipeline::{ConsistencyError, PipelineError, ValidationError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

/// JSON error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
    error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let message = e.to_string();
        let (status, code) = match &e {
            PipelineError::Validation(v) => match v {
                ValidationError::EmptyDocument => (StatusCode::BAD_REQUEST, "empty_document"),
                ValidationError::TooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "document_too_large")
                }
                ValidationError::UnsupportedType(_) => {
                    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_document_type")
                }
                ValidationError::MissingDocuments(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "missing_documents")
                }
                ValidationError::InvalidDetails(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_details")
                }
                ValidationError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            },
            PipelineError::Consistency(c) => {
                let code = match c {
                    ConsistencyError::SubmitInFlight => "submit_in_flight",
                    ConsistencyError::StaleSession { .. } => "stale_session",
                    ConsistencyError::AlreadyAttested => "already_attested",
                    ConsistencyError::OwnershipMismatch => "ownership_mismatch",
                    ConsistencyError::ProfileConflict(_) => "profile_conflict",
                    ConsistencyError::InvalidReview(_) => "invalid_review",
                };
                (StatusCode::CONFLICT, code)
            }
            PipelineError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            PipelineError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "document_not_found"),
            PipelineError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "provider_not_found"),
            PipelineError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            PipelineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            PipelineError::LedgerRejected(_) => (StatusCode::BAD_GATEWAY, "ledger_rejected"),
            PipelineError::RetryableFailure(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "retryable_failure")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %message, code, "Request failed");
        }
        Self::new(status, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}
