// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger capability interface and the adapter the pipeline talks to.
//!
//! [`AttestationLedger`] is the narrow capability an external ledger must
//! offer: accept a commitment payload for an owner, and report whether a
//! submitted transaction was included. [`LedgerAdapter`] adds the policy on
//! top: payload limits, bounded retries, a hard deadline and cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::retry::{retry_with_backoff, RetryPolicy};
use crate::models::{LedgerReference, OwnerIdentity};
use crate::pipeline::composer::AttestationCommitment;

/// Largest payload the registry accepts (the on-chain record capacity).
pub const MAX_PAYLOAD_BYTES: usize = 280;

/// Default hard deadline for submit + confirmation.
pub const DEFAULT_DEADLINE_SECS: u64 = 60;

/// Default interval between confirmation polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger refused the commitment; retrying the same payload is futile.
    #[error("ledger rejected commitment: {0}")]
    Rejected(String),

    #[error("ledger did not confirm within {0:?}")]
    Timeout(Duration),

    #[error("ledger network error: {0}")]
    NetworkError(String),

    /// Signer out of funds / fees.
    #[error("insufficient ledger resources: {0}")]
    InsufficientResources(String),

    #[error("ledger wait cancelled")]
    Cancelled,
}

impl LedgerError {
    /// Whether the adapter retries the call internally.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::NetworkError(_))
    }

    /// Whether the caller may retry the submission later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LedgerError::Rejected(_))
    }
}

// =============================================================================
// Capability
// =============================================================================

/// Inclusion state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { block_number: Option<u64> },
    Pending,
    Reverted(String),
}

/// External attestation ledger.
#[async_trait]
pub trait AttestationLedger: Send + Sync {
    /// Submit a commitment payload; returns the transaction reference.
    async fn submit_commitment(
        &self,
        owner: &OwnerIdentity,
        payload: &[u8],
    ) -> Result<String, LedgerError>;

    /// Check inclusion of a previously submitted transaction.
    async fn confirmation(&self, transaction: &str) -> Result<Confirmation, LedgerError>;

    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Adapter
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct LedgerAdapterConfig {
    pub deadline: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for LedgerAdapterConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(DEFAULT_DEADLINE_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Submits commitments and returns a reference only once inclusion is confirmed.
#[derive(Clone)]
pub struct LedgerAdapter {
    ledger: Arc<dyn AttestationLedger>,
    config: LedgerAdapterConfig,
    shutdown: CancellationToken,
}

impl LedgerAdapter {
    pub fn new(
        ledger: Arc<dyn AttestationLedger>,
        config: LedgerAdapterConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            config,
            shutdown,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.ledger.name()
    }

    /// Anchor a commitment.
    ///
    /// Oversize payloads are rejected before any network call. The whole
    /// submit-and-confirm sequence is bounded by the configured deadline and
    /// aborts with [`LedgerError::Cancelled`] on shutdown.
    pub async fn submit(
        &self,
        commitment: &AttestationCommitment,
    ) -> Result<LedgerReference, LedgerError> {
        let payload = commitment
            .to_payload()
            .map_err(|e| LedgerError::Rejected(format!("unencodable commitment: {e}")))?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(LedgerError::Rejected(format!(
                "payload is {} bytes, limit is {MAX_PAYLOAD_BYTES}",
                payload.len()
            )));
        }

        let owner = &commitment.owner_identity;
        let deadline = self.config.deadline;

        let work = async {
            let transaction = retry_with_backoff(
                self.config.retry,
                "ledger submit",
                LedgerError::is_transient,
                || self.ledger.submit_commitment(owner, &payload),
            )
            .await?;

            tracing::info!(
                owner = %owner,
                transaction = %transaction,
                backend = self.ledger.name(),
                "Commitment submitted, awaiting confirmation"
            );

            self.await_confirmation(transaction).await
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(LedgerError::Cancelled),
            result = tokio::time::timeout(deadline, work) => {
                result.unwrap_or(Err(LedgerError::Timeout(deadline)))
            }
        }
    }

    async fn await_confirmation(
        &self,
        transaction: String,
    ) -> Result<LedgerReference, LedgerError> {
        loop {
            match self.ledger.confirmation(&transaction).await {
                Ok(Confirmation::Confirmed { block_number }) => {
                    return Ok(LedgerReference {
                        transaction,
                        block_number,
                        confirmed_at: Utc::now(),
                    });
                }
                Ok(Confirmation::Reverted(reason)) => {
                    return Err(LedgerError::Rejected(format!(
                        "transaction {transaction} reverted: {reason}"
                    )));
                }
                Ok(Confirmation::Pending) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        transaction = %transaction,
                        error = %e,
                        "Confirmation poll failed"
                    );
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
