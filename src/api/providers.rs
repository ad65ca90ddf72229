// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider record and review endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Identity, IdentityContext},
    error::ApiError,
    models::{OwnerIdentity, ProviderRecord, ProviderStatus},
    pipeline::PipelineError,
    state::AppState,
};

/// Request to move a provider record through manual review.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub status: ProviderStatus,
}

/// The caller's identity and, if one exists, their provider record.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MeResponse {
    pub identity: IdentityContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderRecord>,
}

fn parse_owner(raw: &str) -> Result<OwnerIdentity, ApiError> {
    OwnerIdentity::parse(raw).map_err(ApiError::bad_request)
}

#[utoipa::path(
    get,
    path = "/v1/providers/{owner}",
    tag = "Providers",
    security(("bearer_auth" = [])),
    params(("owner" = String, Path, description = "Owner identity")),
    responses(
        (status = 200, description = "Provider record", body = ProviderRecord),
        (status = 403, description = "Record belongs to another identity"),
        (status = 404, description = "No provider record")
    )
)]
pub async fn get_provider(
    Identity(identity): Identity,
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<ProviderRecord>, ApiError> {
    let owner = parse_owner(&owner)?;
    let record = state.pipeline.get_provider_record(&identity, &owner)?;
    Ok(Json(record))
}

/// Manual review transition. Requires the `reviewer` or `admin` role.
///
/// Allowed moves: `pending → in_review`, `in_review → verified | rejected | pending`.
#[utoipa::path(
    post,
    path = "/v1/providers/{owner}/review",
    tag = "Providers",
    security(("bearer_auth" = [])),
    params(("owner" = String, Path, description = "Owner identity")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Status updated", body = ProviderRecord),
        (status = 403, description = "Reviewer role required"),
        (status = 404, description = "No provider record"),
        (status = 409, description = "Transition not allowed or record not anchored")
    )
)]
pub async fn review_provider(
    Identity(identity): Identity,
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ProviderRecord>, ApiError> {
    let owner = parse_owner(&owner)?;
    let record = state
        .pipeline
        .review_provider(&identity, &owner, request.status)?;
    Ok(Json(record))
}

#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Providers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller identity", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn me(
    Identity(identity): Identity,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, ApiError> {
    let provider = match state
        .pipeline
        .get_provider_record(&identity, &identity.owner)
    {
        Ok(record) => Some(record),
        Err(PipelineError::RecordNotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    Ok(Json(MeResponse { identity, provider }))
}
