// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification session endpoints.
//!
//! A provider starts (or resumes) a session, uploads the required documents
//! one multipart request at a time, and submits. Every handler runs with the
//! caller's [`IdentityContext`](crate::auth::IdentityContext).

use std::collections::BTreeMap;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Identity,
    error::ApiError,
    models::{DocumentDescriptor, DocumentType, ProviderDetails},
    pipeline::{SubmissionOutcome, Upload, VerificationSession},
    state::AppState,
};

/// Session plus derived progress fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: VerificationSession,
    /// Required types not yet uploaded.
    pub missing_document_types: Vec<DocumentType>,
    /// Whether the session can be submitted now.
    pub ready: bool,
}

impl From<VerificationSession> for SessionView {
    fn from(session: VerificationSession) -> Self {
        Self {
            missing_document_types: session.missing_document_types(),
            ready: session.ensure_can_submit().is_ok(),
            session,
        }
    }
}

/// Response after uploading a document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadDocumentResponse {
    pub document: DocumentDescriptor,
    /// False when identical content was already collected under this type.
    pub added: bool,
    pub session: SessionView,
}

/// Multipart form accepted by the upload endpoint. Documentation only.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadDocumentForm {
    /// One of the closed document types, e.g. `tax_certificate`.
    document_type: String,
    /// PDF, JPEG or PNG bytes.
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    file: Vec<u8>,
    /// Optional JSON object of string metadata.
    metadata: Option<String>,
}

/// Start a verification session or resume the caller's open one.
#[utoipa::path(
    post,
    path = "/v1/sessions",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Session started", body = SessionView),
        (status = 200, description = "Open session resumed", body = SessionView),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Identity holds a buyer profile")
    )
)]
pub async fn start_session(
    Identity(identity): Identity,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let (session, created) = state.pipeline.start_session(&identity).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(session.into())))
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{session_id}",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("session_id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session", body = SessionView),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session belongs to another identity")
    )
)]
pub async fn get_session(
    Identity(identity): Identity,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.pipeline.get_session(&identity, session_id).await?;
    Ok(Json(session.into()))
}

/// Attach or replace the provider's business details.
#[utoipa::path(
    put,
    path = "/v1/sessions/{session_id}/details",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("session_id" = Uuid, Path, description = "Session ID")),
    request_body = ProviderDetails,
    responses(
        (status = 200, description = "Details stored", body = SessionView),
        (status = 404, description = "Session not found"),
        (status = 422, description = "Invalid details")
    )
)]
pub async fn set_details(
    Identity(identity): Identity,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(details): Json<ProviderDetails>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state
        .pipeline
        .set_details(&identity, session_id, details)
        .await?;
    Ok(Json(session.into()))
}

/// Upload one document.
///
/// Re-uploading identical content under the same type returns the existing
/// descriptor with `added: false`.
#[utoipa::path(
    post,
    path = "/v1/sessions/{session_id}/documents",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("session_id" = Uuid, Path, description = "Session ID")),
    request_body(content = UploadDocumentForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document added", body = UploadDocumentResponse),
        (status = 200, description = "Identical document already collected", body = UploadDocumentResponse),
        (status = 400, description = "Empty document or malformed form"),
        (status = 413, description = "Document too large"),
        (status = 415, description = "Unsupported document format"),
        (status = 503, description = "Blob storage unavailable; retry")
    )
)]
pub async fn upload_document(
    Identity(identity): Identity,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadDocumentResponse>), ApiError> {
    let mut document_type: Option<DocumentType> = None;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut metadata = BTreeMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("document_type") => {
                let raw = field.text().await.map_err(multipart_error)?;
                document_type = Some(raw.parse().map_err(ApiError::bad_request)?);
            }
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("metadata") => {
                let raw = field.text().await.map_err(multipart_error)?;
                metadata = serde_json::from_str(&raw).map_err(|e| {
                    ApiError::bad_request(format!("metadata must be a JSON object of strings: {e}"))
                })?;
            }
            _ => {}
        }
    }

    let document_type =
        document_type.ok_or_else(|| ApiError::bad_request("missing `document_type` field"))?;
    let (file_name, bytes) = file.ok_or_else(|| ApiError::bad_request("missing `file` field"))?;

    let upload = Upload {
        document_type,
        file_name: file_name.as_deref(),
        bytes: &bytes,
        metadata,
    };
    let (document, added) = state
        .pipeline
        .upload_document(&identity, session_id, upload)
        .await?;
    let session = state.pipeline.get_session(&identity, session_id).await?;

    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(UploadDocumentResponse {
            document,
            added,
            session: session.into(),
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{session_id}/documents/{document_id}",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(
        ("session_id" = Uuid, Path, description = "Session ID"),
        ("document_id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document removed", body = SessionView),
        (status = 404, description = "Session or document not found"),
        (status = 409, description = "Session no longer accepts changes")
    )
)]
pub async fn remove_document(
    Identity(identity): Identity,
    State(state): State<AppState>,
    Path((session_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state
        .pipeline
        .remove_document(&identity, session_id, document_id)
        .await?;
    Ok(Json(session.into()))
}

/// Submit the session for attestation.
///
/// Runs to completion even if the client disconnects, so the session never
/// stays in `submitting`.
#[utoipa::path(
    post,
    path = "/v1/sessions/{session_id}/submit",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("session_id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Commitment anchored and recorded", body = SubmissionOutcome),
        (status = 409, description = "Submission in flight or already attested"),
        (status = 422, description = "Required documents missing"),
        (status = 502, description = "Ledger rejected the commitment"),
        (status = 503, description = "Transient failure; retry")
    )
)]
pub async fn submit(
    Identity(identity): Identity,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let pipeline = state.pipeline.clone();
    let outcome = tokio::spawn(async move { pipeline.submit(&identity, session_id).await })
        .await
        .map_err(|e| ApiError::internal(format!("submission task failed: {e}")))??;
    Ok(Json(outcome))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(e.status(), "invalid_multipart", e.body_text())
}
