// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication for the attestation API.
//!
//! ## Auth Flow
//!
//! 1. The marketplace front end obtains a JWT for the connected identity
//! 2. It sends `Authorization: Bearer <JWT>`
//! 3. The server:
//!    - Verifies the HS256 signature, expiry and (optionally) issuer
//!    - Takes `sub` as the owner identity and `role` as the staff role
//!    - Resolves the marketplace profile with one record-store read
//!
//! The result is an [`IdentityContext`] that handlers pass to every
//! pipeline operation.
//!
//! ## Security
//!
//! - All non-health endpoints require authentication
//! - Without `AUTH_JWT_SECRET`, tokens are rejected unless the crate is
//!   built with the `dev` feature (structure-only decode)
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod roles;

pub use claims::{AuthenticatedUser, TokenClaims};
pub use error::AuthError;
pub use extractor::{verify_token, Auth, Identity};
pub use identity::IdentityContext;
pub use roles::Role;
