// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staff roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role carried in the token's `role` claim.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, including manual review
/// - `Reviewer` - Manual review of provider records
/// - `Client` - Marketplace user, can only act on its own identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Provider review staff
    Reviewer,
    /// Normal marketplace user
    #[default]
    Client,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Reviewer, Role::Reviewer | Role::Client) => true,
            (Role::Client, Role::Client) => true,
            _ => false,
        }
    }

    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "reviewer" => Some(Role::Reviewer),
            "client" => Some(Role::Client),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Reviewer => write!(f, "reviewer"),
            Role::Client => write!(f, "client"),
        }
    }
}
