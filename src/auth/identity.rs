// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request identity context.
//!
//! Built once per request from the verified token and a single profile
//! lookup, then passed explicitly to every pipeline operation.

use serde::Serialize;
use utoipa::ToSchema;

use super::{AuthError, AuthenticatedUser, Role};
use crate::models::{OwnerIdentity, ProfileRole};
use crate::storage::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct IdentityContext {
    pub owner: OwnerIdentity,
    pub role: Role,
    pub profile: ProfileRole,
}

impl IdentityContext {
    pub fn new(owner: OwnerIdentity, role: Role, profile: ProfileRole) -> Self {
        Self {
            owner,
            role,
            profile,
        }
    }

    /// Resolve the marketplace profile for an authenticated user.
    pub fn resolve(user: &AuthenticatedUser, records: &dyn RecordStore) -> Result<Self, AuthError> {
        let owner =
            OwnerIdentity::parse(&user.user_id).map_err(AuthError::InvalidSubject)?;
        let profile = records
            .resolve_role(&owner)
            .map_err(|e| AuthError::ProfileUnavailable(e.to_string()))?;

        Ok(Self::new(owner, user.role, profile))
    }

    /// Whether the caller may read or act on another owner's records.
    pub fn is_staff(&self) -> bool {
        self.role.has_privilege(Role::Reviewer)
    }

    pub fn can_review(&self) -> bool {
        self.is_staff()
    }

    pub fn can_access(&self, owner: &OwnerIdentity) -> bool {
        &self.owner == owner || self.is_staff()
    }
}
