// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{IdentityContext, Role},
    error::ErrorBody,
    models::{
        AttestationMarker, ContentFormat, DocumentDescriptor, DocumentMetadata, DocumentType,
        LedgerReference, OwnerIdentity, ProfileRole, ProviderDetails, ProviderRecord,
        ProviderStatus,
    },
    pipeline::{SessionState, SubmissionOutcome, VerificationSession, MAX_DOCUMENT_BYTES},
    state::AppState,
};

pub mod health;
pub mod providers;
pub mod sessions;

/// Multipart framing allowance on top of the document size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/sessions", post(sessions::start_session))
        .route("/sessions/{session_id}", get(sessions::get_session))
        .route("/sessions/{session_id}/details", put(sessions::set_details))
        .route(
            "/sessions/{session_id}/documents",
            post(sessions::upload_document)
                .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES + MULTIPART_OVERHEAD_BYTES)),
        )
        .route(
            "/sessions/{session_id}/documents/{document_id}",
            delete(sessions::remove_document),
        )
        .route("/sessions/{session_id}/submit", post(sessions::submit))
        .route("/providers/{owner}", get(providers::get_provider))
        .route("/providers/{owner}/review", post(providers::review_provider))
        .route("/me", get(providers::me));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Registers the bearer JWT scheme referenced by `security(("bearer_auth" = []))`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        sessions::start_session,
        sessions::get_session,
        sessions::set_details,
        sessions::upload_document,
        sessions::remove_document,
        sessions::submit,
        providers::get_provider,
        providers::review_provider,
        providers::me
    ),
    components(
        schemas(
            ErrorBody,
            OwnerIdentity,
            DocumentType,
            ContentFormat,
            DocumentDescriptor,
            DocumentMetadata,
            ProviderDetails,
            ProviderStatus,
            ProviderRecord,
            LedgerReference,
            AttestationMarker,
            ProfileRole,
            Role,
            IdentityContext,
            SessionState,
            VerificationSession,
            SubmissionOutcome,
            sessions::SessionView,
            sessions::UploadDocumentResponse,
            sessions::UploadDocumentForm,
            providers::ReviewRequest,
            providers::MeResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Sessions", description = "Provider verification sessions and document upload"),
        (name = "Providers", description = "Attested provider records and manual review")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::extractor::tests::{token, TEST_SECRET};
    use crate::models::DocumentType;
    use crate::pipeline::test_support::test_pipeline;
    use crate::state::AuthConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "rizoma-test-boundary";

    fn app(t: &crate::pipeline::test_support::TestPipeline) -> Router {
        let auth = AuthConfig::with_secret(TEST_SECRET, Some("rizoma".to_string()));
        router(AppState::for_pipeline(t, auth))
    }

    fn required() -> std::collections::BTreeSet<DocumentType> {
        [DocumentType::TaxCertificate, DocumentType::BankStatement]
            .into_iter()
            .collect()
    }

    fn authed(method: &str, uri: &str, sub: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token(sub, None, 3600)))
    }

    fn multipart_body(document_type: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"document_type\"\r\n\r\n{document_type}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{document_type}.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn upload(
        app: &Router,
        session_id: &str,
        document_type: &str,
        bytes: &[u8],
    ) -> StatusCode {
        let req = authed("POST", &format!("/v1/sessions/{session_id}/documents"), "alice")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(document_type, bytes)))
            .unwrap();
        app.clone().oneshot(req).await.unwrap().status()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public_and_tagged_with_request_id() {
        let t = test_pipeline(required());
        let resp = app(&t)
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn v1_routes_require_bearer_token() {
        let t = test_pipeline(required());
        let resp = app(&t)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn full_onboarding_flow_over_http() {
        let t = test_pipeline(required());
        let app = app(&t);

        let resp = app
            .clone()
            .oneshot(authed("POST", "/v1/sessions", "alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let session = body_json(resp).await;
        let session_id = session["id"].as_str().unwrap().to_string();
        assert_eq!(session["state"], "draft");
        assert_eq!(session["ready"], false);

        assert_eq!(
            upload(&app, &session_id, "tax_certificate", b"%PDF-1.4\nrfc").await,
            StatusCode::CREATED
        );
        // Same bytes again coalesce.
        assert_eq!(
            upload(&app, &session_id, "tax_certificate", b"%PDF-1.4\nrfc").await,
            StatusCode::OK
        );
        assert_eq!(
            upload(&app, &session_id, "bank_statement", b"not a document").await,
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );

        // Incomplete submit is rejected with the missing types.
        let resp = app
            .clone()
            .oneshot(
                authed("POST", &format!("/v1/sessions/{session_id}/submit"), "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["error_code"], "missing_documents");

        assert_eq!(
            upload(&app, &session_id, "bank_statement", b"%PDF-1.4\nstatement").await,
            StatusCode::CREATED
        );

        let resp = app
            .clone()
            .oneshot(
                authed("POST", &format!("/v1/sessions/{session_id}/submit"), "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome = body_json(resp).await;
        assert_eq!(outcome["status"], "pending");
        assert_eq!(outcome["document_count"], 2);

        let resp = app
            .oneshot(authed("GET", "/v1/providers/alice", "alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let record = body_json(resp).await;
        assert_eq!(record["combined_hash"], outcome["combined_hash"]);
    }

    #[tokio::test]
    async fn unknown_document_type_is_bad_request() {
        let t = test_pipeline(required());
        let app = app(&t);
        let resp = app
            .clone()
            .oneshot(authed("POST", "/v1/sessions", "alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let session_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        assert_eq!(
            upload(&app, &session_id, "passport_photo", b"%PDF-1.4\nx").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/v1/sessions/{session_id}/submit"));
    }
}
