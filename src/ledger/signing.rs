// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registry signer loading.
//!
//! The service submits commitments from a single operator key stored as a PEM
//! file (`LEDGER_SIGNER_KEY_PATH`). Both SEC1 (`EC PRIVATE KEY`) and PKCS#8
//! (`PRIVATE KEY`) encodings of a secp256k1 key are accepted.

use std::path::Path;

use alloy::{network::EthereumWallet, signers::local::PrivateKeySigner};
use k256::SecretKey;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("failed to read signer key {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid signer key: {0}")]
    InvalidKey(String),
}

/// Parse a PEM-encoded secp256k1 private key to a hex string (no 0x prefix).
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, SignerError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| SignerError::InvalidKey(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| SignerError::InvalidKey(format!("Invalid PEM: {}", e)))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| SignerError::InvalidKey(format!("Invalid key format: {}", e)))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}

/// Create a signer from a hex-encoded private key.
pub fn signer_from_hex(private_key_hex: &str) -> Result<PrivateKeySigner, SignerError> {
    let key_bytes = alloy::hex::decode(private_key_hex)
        .map_err(|e| SignerError::InvalidKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))
}

/// Create a signer from PEM-encoded private key bytes.
pub fn signer_from_pem(pem_bytes: &[u8]) -> Result<PrivateKeySigner, SignerError> {
    let hex_key = pem_to_hex(pem_bytes)?;
    signer_from_hex(&hex_key)
}

/// Load the operator wallet from a PEM file.
pub fn wallet_from_pem_file(path: &Path) -> Result<EthereumWallet, SignerError> {
    let pem_bytes = std::fs::read(path).map_err(|source| SignerError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let signer = signer_from_pem(&pem_bytes)?;
    tracing::info!(address = %signer.address(), "Loaded ledger signer");
    Ok(EthereumWallet::from(signer))
}
