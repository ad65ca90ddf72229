// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Data Models
//!
//! Types shared by the intake, session, ledger and persistence layers. All
//! types derive `Serialize`, `Deserialize`, and `ToSchema` so the same
//! structures are stored in redb and returned by the REST API.
//!
//! ## Model Categories
//!
//! - **Documents**: [`DocumentType`], [`ContentFormat`], [`DocumentDescriptor`]
//! - **Providers**: [`ProviderDetails`], [`ProviderRecord`], [`ProviderStatus`]
//! - **Attestation**: [`LedgerReference`], [`AttestationMarker`]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Maximum length of an owner identity (base58 wallet keys are 32-44 chars).
pub const MAX_OWNER_IDENTITY_LEN: usize = 64;

// =============================================================================
// Owner Identity
// =============================================================================

/// Identity of the party onboarding as a provider (JWT `sub` or wallet key).
///
/// This is the unique key of a [`ProviderRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct OwnerIdentity(String);

impl OwnerIdentity {
    /// Validate and wrap an owner identity.
    ///
    /// Identities are non-empty, at most [`MAX_OWNER_IDENTITY_LEN`] bytes and
    /// limited to ASCII alphanumerics plus `_`, `-`, `.`, `:` so they are safe
    /// to embed in blob keys and redb composite keys.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value = raw.trim();
        if value.is_empty() {
            return Err("owner identity must not be empty".to_string());
        }
        if value.len() > MAX_OWNER_IDENTITY_LEN {
            return Err(format!(
                "owner identity exceeds {MAX_OWNER_IDENTITY_LEN} characters"
            ));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        {
            return Err("owner identity contains unsupported characters".to_string());
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Document Models
// =============================================================================

/// Closed set of legal and certification documents a provider can submit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Business registration (Registro Empresarial)
    BusinessRegistration,
    /// Tax certificate (RFC)
    TaxCertificate,
    /// Phytosanitary certificate
    PhytosanitaryCertificate,
    /// Organic certification
    OrganicCertification,
    /// Quality certification
    QualityCertification,
    /// Export license
    ExportLicense,
    /// Bank statement
    BankStatement,
    /// Official identity document
    IdentityDocument,
}

impl DocumentType {
    pub const ALL: [DocumentType; 8] = [
        DocumentType::BusinessRegistration,
        DocumentType::TaxCertificate,
        DocumentType::PhytosanitaryCertificate,
        DocumentType::OrganicCertification,
        DocumentType::QualityCertification,
        DocumentType::ExportLicense,
        DocumentType::BankStatement,
        DocumentType::IdentityDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::BusinessRegistration => "business_registration",
            DocumentType::TaxCertificate => "tax_certificate",
            DocumentType::PhytosanitaryCertificate => "phytosanitary_certificate",
            DocumentType::OrganicCertification => "organic_certification",
            DocumentType::QualityCertification => "quality_certification",
            DocumentType::ExportLicense => "export_license",
            DocumentType::BankStatement => "bank_statement",
            DocumentType::IdentityDocument => "identity_document",
        }
    }

    /// Documents every provider must submit unless configured otherwise.
    pub fn default_required() -> BTreeSet<DocumentType> {
        [
            DocumentType::BusinessRegistration,
            DocumentType::TaxCertificate,
            DocumentType::BankStatement,
            DocumentType::IdentityDocument,
        ]
        .into_iter()
        .collect()
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("unknown document type `{s}`"))
    }
}

/// File format detected from the uploaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Pdf,
    Jpeg,
    Png,
}

impl ContentFormat {
    /// Sniff the format from magic bytes. Returns `None` for anything else.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            Some(ContentFormat::Pdf)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ContentFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ContentFormat::Png)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentFormat::Pdf => "pdf",
            ContentFormat::Jpeg => "jpg",
            ContentFormat::Png => "png",
        }
    }
}

/// Metadata plus content hash identifying one uploaded document.
///
/// Immutable once created; the session only ever appends or drops whole
/// descriptors.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DocumentDescriptor {
    /// Descriptor ID (used for removal from a session)
    pub id: Uuid,
    /// Declared document type
    pub document_type: DocumentType,
    /// Original file name or caller-provided label
    pub display_name: String,
    /// Lowercase hex SHA-256 of the raw bytes
    pub content_hash: String,
    /// URI of the stored blob
    pub storage_locator: String,
    /// Detected file format
    pub content_format: ContentFormat,
    /// Size of the raw bytes
    pub size_bytes: u64,
    /// When the blob write was confirmed
    pub uploaded_at: DateTime<Utc>,
    /// Free-form extra attributes (issuer, expiry, certificate number, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

// =============================================================================
// Provider Models
// =============================================================================

/// Company and contact information captured during onboarding.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ProviderDetails {
    /// Trade name
    pub company_name: String,
    /// Registered legal name
    pub legal_name: String,
    /// Tax identifier (RFC)
    pub tax_id: String,
    /// Contact email
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

fn default_country() -> String {
    "Mexico".to_string()
}

impl ProviderDetails {
    /// Check required fields and basic formats.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("company_name", &self.company_name),
            ("legal_name", &self.legal_name),
            ("tax_id", &self.tax_id),
            ("email", &self.email),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{field} is required"));
            }
        }

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err("email is not a valid address".to_string()),
        }

        if let Some(website) = &self.website {
            let parsed = url::Url::parse(website)
                .map_err(|e| format!("website is not a valid URL: {e}"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err("website must be an http(s) URL".to_string());
            }
        }

        Ok(())
    }
}

/// Verification status of a provider record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Submitted; ledger anchoring proves submission, not approval
    Pending,
    /// A reviewer picked the record up
    InReview,
    /// Approved by manual review
    Verified,
    /// Rejected by manual review
    Rejected,
}

impl ProviderStatus {
    /// Whether a manual review may move a record from `self` to `next`.
    pub fn can_transition_to(&self, next: ProviderStatus) -> bool {
        matches!(
            (self, next),
            (ProviderStatus::Pending, ProviderStatus::InReview)
                | (ProviderStatus::InReview, ProviderStatus::Verified)
                | (ProviderStatus::InReview, ProviderStatus::Rejected)
                | (ProviderStatus::InReview, ProviderStatus::Pending)
        )
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderStatus::Pending => "pending",
            ProviderStatus::InReview => "in_review",
            ProviderStatus::Verified => "verified",
            ProviderStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Confirmed inclusion of a commitment on the attestation ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LedgerReference {
    /// Transaction reference returned by the ledger (hash / signature)
    pub transaction: String,
    /// Block or slot in which inclusion was confirmed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// When confirmation was observed
    pub confirmed_at: DateTime<Utc>,
}

/// Where the ledger leg of the saga stands for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttestationMarker {
    /// Record written, ledger not yet invoked
    Unanchored,
    /// Ledger submission in flight
    Submitting { since: DateTime<Utc> },
    /// Ledger confirmed inclusion; `ledger_reference` is set
    Anchored,
    /// Ledger leg failed; `ledger_reference` stays null
    Failed {
        reason: String,
        retryable: bool,
        at: DateTime<Utc>,
    },
}

/// Document metadata row mirrored from the session at submit time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub document_type: DocumentType,
    pub display_name: String,
    pub content_hash: String,
    pub storage_locator: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl From<&DocumentDescriptor> for DocumentMetadata {
    fn from(d: &DocumentDescriptor) -> Self {
        Self {
            document_type: d.document_type,
            display_name: d.display_name.clone(),
            content_hash: d.content_hash.clone(),
            storage_locator: d.storage_locator.clone(),
            uploaded_at: d.uploaded_at,
            metadata: d.metadata.clone(),
        }
    }
}

/// Durable, identity-keyed record of a provider's verification state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ProviderRecord {
    /// Record ID
    pub id: Uuid,
    /// Unique key
    pub owner_identity: OwnerIdentity,
    /// Review status
    pub status: ProviderStatus,
    /// Set only after the ledger confirmed inclusion
    pub ledger_reference: Option<LedgerReference>,
    /// Ledger leg marker
    pub attestation: AttestationMarker,
    /// Commitment over the document set
    pub combined_hash: String,
    /// Number of distinct documents committed
    pub document_count: usize,
    /// Document metadata rows
    pub documents: Vec<DocumentMetadata>,
    /// Company details, if captured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ProviderDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderRecord {
    pub fn is_anchored(&self) -> bool {
        self.ledger_reference.is_some()
    }
}

// =============================================================================
// Profiles
// =============================================================================

/// Marketplace profile held by an identity, resolved from one store read.
///
/// A provider record wins over a buyer profile; an identity with neither is
/// unregistered and may start onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileRole {
    ProviderProfile { status: ProviderStatus },
    BuyerProfile,
    Unregistered,
}

/// Buyer-side marketplace profile. Created outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BuyerProfile {
    pub owner_identity: OwnerIdentity,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}
