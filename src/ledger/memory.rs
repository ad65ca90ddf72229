// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process attestation ledger.
//!
//! Append-only list of `{owner, payload}` records that confirms immediately.
//! Selected with `LEDGER_MODE=memory` for local development; entries are lost
//! on restart.

use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::client::{AttestationLedger, Confirmation, LedgerError};
use crate::models::OwnerIdentity;

/// One appended commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub transaction: String,
    pub owner: OwnerIdentity,
    pub payload: Vec<u8>,
    /// 1-based position, reported as the block number.
    pub sequence: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every appended entry, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AttestationLedger for InMemoryLedger {
    async fn submit_commitment(
        &self,
        owner: &OwnerIdentity,
        payload: &[u8],
    ) -> Result<String, LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::NetworkError("in-memory ledger poisoned".to_string()))?;

        let sequence = entries.len() as u64 + 1;
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_be_bytes());
        hasher.update(owner.as_str().as_bytes());
        hasher.update(payload);
        let transaction = format!("0x{}", alloy::hex::encode(hasher.finalize()));

        entries.push(LedgerEntry {
            transaction: transaction.clone(),
            owner: owner.clone(),
            payload: payload.to_vec(),
            sequence,
        });
        Ok(transaction)
    }

    async fn confirmation(&self, transaction: &str) -> Result<Confirmation, LedgerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::NetworkError("in-memory ledger poisoned".to_string()))?;

        Ok(entries
            .iter()
            .find(|e| e.transaction == transaction)
            .map(|e| Confirmation::Confirmed {
                block_number: Some(e.sequence),
            })
            .unwrap_or_else(|| Confirmation::Reverted("unknown transaction".to_string())))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
