// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation commitment composition.
//!
//! The combined hash is SHA-256 over the concatenated raw 32-byte digests of
//! the distinct document hashes, sorted ascending. Sorting the raw digests and
//! sorting their lowercase hex give the same order, so a third party holding
//! the hex hashes can recompute the value with [`verify`].
//!
//! Everything here is pure; no I/O and no clock reads.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::models::{DocumentDescriptor, OwnerIdentity};

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("cannot commit to an empty document set")]
    Empty,

    #[error("invalid content hash: {0}")]
    InvalidDigest(String),
}

/// Commitment over a provider's document set, published to the ledger.
///
/// Derived from the session at submit time; never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationCommitment {
    pub combined_hash: String,
    pub document_count: usize,
    pub owner_identity: OwnerIdentity,
    pub timestamp: DateTime<Utc>,
}

impl AttestationCommitment {
    /// Canonical ledger payload: compact JSON with fixed field order.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// SHA-256 of raw bytes as lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    alloy::hex::encode(Sha256::digest(bytes))
}

fn decode_digest(hash: &str) -> Result<[u8; DIGEST_LEN], ComposeError> {
    let bytes = alloy::hex::decode(hash.trim())
        .map_err(|e| ComposeError::InvalidDigest(format!("{hash}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| ComposeError::InvalidDigest(format!("{hash}: expected {DIGEST_LEN} bytes")))
}

/// Combined hash and distinct-document count for a set of content hashes.
///
/// Duplicates collapse and input order is irrelevant.
pub fn combined_hash<I, S>(hashes: I) -> Result<(String, usize), ComposeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let digests = hashes
        .into_iter()
        .map(|h| decode_digest(h.as_ref()))
        .collect::<Result<BTreeSet<_>, _>>()?;

    if digests.is_empty() {
        return Err(ComposeError::Empty);
    }

    let mut hasher = Sha256::new();
    for digest in &digests {
        hasher.update(digest);
    }
    Ok((alloy::hex::encode(hasher.finalize()), digests.len()))
}

/// Build the commitment for an owner's collected documents.
///
/// `timestamp` is truncated to whole seconds so the payload is stable.
pub fn compose(
    owner: &OwnerIdentity,
    documents: &[DocumentDescriptor],
    timestamp: DateTime<Utc>,
) -> Result<AttestationCommitment, ComposeError> {
    let (combined_hash, document_count) =
        combined_hash(documents.iter().map(|d| d.content_hash.as_str()))?;

    Ok(AttestationCommitment {
        combined_hash,
        document_count,
        owner_identity: owner.clone(),
        timestamp: DateTime::from_timestamp(timestamp.timestamp(), 0).unwrap_or(timestamp),
    })
}

/// Recompute the combined hash from published document hashes and compare.
pub fn verify<I, S>(hashes: I, expected: &str) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    combined_hash(hashes)
        .map(|(hash, _)| hash.eq_ignore_ascii_case(expected.trim()))
        .unwrap_or(false)
}
