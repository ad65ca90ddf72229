// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! ```rust,ignore
//! async fn handler(Identity(identity): Identity) -> impl IntoResponse {
//!     // identity is IdentityContext
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, Validation};

use super::{AuthError, AuthenticatedUser, IdentityContext, TokenClaims};
use crate::state::{AppState, AuthConfig};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Verified token holder.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_token(token.trim(), &state.auth_config)?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Verified token holder with its resolved marketplace profile.
///
/// The profile is read once per request and cached in the request extensions.
pub struct Identity(pub IdentityContext);

impl FromRequestParts<AppState> for Identity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<IdentityContext>().cloned() {
            return Ok(Identity(identity));
        }

        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        let identity = IdentityContext::resolve(&user, state.records.as_ref())?;
        parts.extensions.insert(identity.clone());
        Ok(Identity(identity))
    }
}

/// Verify a bearer token against the configured secret.
pub fn verify_token(token: &str, config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    match &config.decoding_key {
        Some(key) => {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.leeway = CLOCK_SKEW_LEEWAY;
            validation.validate_aud = false;
            validation.set_required_spec_claims(&["exp", "sub"]);
            if let Some(issuer) = &config.issuer {
                validation.set_issuer(&[issuer]);
            }

            let token_data = decode::<TokenClaims>(token, key, &validation).map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                    ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                    ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                    _ => AuthError::MalformedToken,
                }
            })?;
            Ok(AuthenticatedUser::from_claims(token_data.claims))
        }
        None => verify_unsigned(token),
    }
}

/// Structure-only decode for local development.
#[cfg(feature = "dev")]
fn verify_unsigned(token: &str) -> Result<AuthenticatedUser, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;
    let claims = token_data.claims;

    if claims.exp < chrono::Utc::now().timestamp() - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }
    tracing::debug!(sub = %claims.sub, "Accepted unsigned development token");
    Ok(AuthenticatedUser::from_claims(claims))
}

#[cfg(not(feature = "dev"))]
fn verify_unsigned(_token: &str) -> Result<AuthenticatedUser, AuthError> {
    Err(AuthError::NotConfigured)
}
