// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Attestation Ledger
//!
//! The pipeline anchors each provider commitment on an external, append-only
//! ledger. This module holds the capability trait, the adapter that applies
//! retry/deadline/cancellation policy, and the two backends:
//!
//! - [`InMemoryLedger`] (`LEDGER_MODE=memory`): process-local, confirms at once
//! - [`EvmAttestationLedger`] (`LEDGER_MODE=evm`): registry contract via alloy

pub mod client;
pub mod evm;
pub mod memory;
pub mod retry;
pub mod signing;

pub use client::{
    AttestationLedger, Confirmation, LedgerAdapter, LedgerAdapterConfig, LedgerError,
    MAX_PAYLOAD_BYTES,
};
pub use evm::EvmAttestationLedger;
pub use memory::{InMemoryLedger, LedgerEntry};
pub use retry::{retry_with_backoff, RetryPolicy};
