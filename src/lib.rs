// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rizoma Attestation - provider verification and ledger attestation service
//!
//! Collects a marketplace provider's legal documents, commits to the set with
//! an order-independent content digest, anchors the commitment on an
//! attestation ledger and records the attested state.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer token verification and per-request identity
//! - `pipeline` - Intake, sessions, commitment and the persistence saga
//! - `ledger` - Attestation ledger trait, retrying adapter and backends
//! - `storage` - Blob store, provider records (redb), cache and audit log

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod state;
pub mod storage;
