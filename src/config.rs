// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`AppConfig`] loaded once at
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for blobs, records and audit logs | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key; HTTPS when both set | unset (HTTP) |
//! | `AUTH_JWT_SECRET` | HS256 secret for bearer tokens | Required outside `dev` builds |
//! | `AUTH_ISSUER` | Expected `iss` claim | Optional |
//! | `REQUIRED_DOCUMENT_TYPES` | Comma-separated document types | business_registration, tax_certificate, bank_statement, identity_document |
//! | `LEDGER_MODE` | `memory` or `evm` | `memory` |
//! | `LEDGER_RPC_URL` | EVM JSON-RPC endpoint | Required for `evm` |
//! | `LEDGER_REGISTRY_ADDRESS` | Attestation registry contract | Required for `evm` |
//! | `LEDGER_SIGNER_KEY_PATH` | PEM secp256k1 signing key | Required for `evm` |
//! | `LEDGER_DEADLINE_SECS` | Submit-and-confirm deadline | `60` |
//! | `LEDGER_MAX_ATTEMPTS` | Attempts per transient failure | `3` |
//! | `BLOB_PUBLIC_BASE_URL` | Base URL for blob locators | `file://` locators |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::models::DocumentType;

/// Root directory for all persistent state.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "/data";

pub const HOST_ENV: &str = "HOST";
pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const PORT_ENV: &str = "PORT";
pub const DEFAULT_PORT: u16 = 8080;

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

/// Shared HS256 secret. Without it only `dev` builds accept tokens.
pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";

pub const REQUIRED_DOCUMENT_TYPES_ENV: &str = "REQUIRED_DOCUMENT_TYPES";

pub const LEDGER_MODE_ENV: &str = "LEDGER_MODE";
pub const LEDGER_RPC_URL_ENV: &str = "LEDGER_RPC_URL";
pub const LEDGER_REGISTRY_ADDRESS_ENV: &str = "LEDGER_REGISTRY_ADDRESS";
pub const LEDGER_SIGNER_KEY_PATH_ENV: &str = "LEDGER_SIGNER_KEY_PATH";
pub const LEDGER_DEADLINE_SECS_ENV: &str = "LEDGER_DEADLINE_SECS";
pub const LEDGER_MAX_ATTEMPTS_ENV: &str = "LEDGER_MAX_ATTEMPTS";

pub const BLOB_PUBLIC_BASE_URL_ENV: &str = "BLOB_PUBLIC_BASE_URL";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Provider record cache sizing.
pub const RECORD_CACHE_CAPACITY: usize = 1024;
pub const RECORD_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is required: {reason}")]
    Missing { var: &'static str, reason: &'static str },

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// In-process ledger; commitments are lost on restart
    Memory,
    /// EVM attestation registry contract
    Evm,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Connection settings for the EVM registry.
#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub rpc_url: String,
    pub registry_address: String,
    pub signer_key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub mode: LedgerMode,
    pub evm: Option<EvmSettings>,
    pub deadline: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsPaths>,
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub required_document_types: BTreeSet<DocumentType>,
    pub ledger: LedgerSettings,
    pub blob_public_base_url: Option<Url>,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: PORT_ENV,
                reason: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    var: TLS_KEY_PATH_ENV,
                    reason: "TLS_CERT_PATH is set",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing {
                    var: TLS_CERT_PATH_ENV,
                    reason: "TLS_KEY_PATH is set",
                })
            }
        };

        let required_document_types = match get(REQUIRED_DOCUMENT_TYPES_ENV) {
            Some(raw) => parse_document_types(&raw)?,
            None => DocumentType::default_required(),
        };

        let mode = match get(LEDGER_MODE_ENV).as_deref() {
            None | Some("memory") => LedgerMode::Memory,
            Some("evm") => LedgerMode::Evm,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: LEDGER_MODE_ENV,
                    reason: format!("expected 'memory' or 'evm', got '{other}'"),
                })
            }
        };

        let evm = match mode {
            LedgerMode::Memory => None,
            LedgerMode::Evm => Some(EvmSettings {
                rpc_url: get(LEDGER_RPC_URL_ENV).ok_or(ConfigError::Missing {
                    var: LEDGER_RPC_URL_ENV,
                    reason: "LEDGER_MODE is evm",
                })?,
                registry_address: get(LEDGER_REGISTRY_ADDRESS_ENV).ok_or(ConfigError::Missing {
                    var: LEDGER_REGISTRY_ADDRESS_ENV,
                    reason: "LEDGER_MODE is evm",
                })?,
                signer_key_path: get(LEDGER_SIGNER_KEY_PATH_ENV)
                    .ok_or(ConfigError::Missing {
                        var: LEDGER_SIGNER_KEY_PATH_ENV,
                        reason: "LEDGER_MODE is evm",
                    })?
                    .into(),
            }),
        };

        let deadline_secs: u64 = parse_or(&get, LEDGER_DEADLINE_SECS_ENV, 60)?;
        let max_attempts: u32 = parse_or(&get, LEDGER_MAX_ATTEMPTS_ENV, 3)?;
        if deadline_secs == 0 || max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: if deadline_secs == 0 {
                    LEDGER_DEADLINE_SECS_ENV
                } else {
                    LEDGER_MAX_ATTEMPTS_ENV
                },
                reason: "must be greater than zero".to_string(),
            });
        }

        let blob_public_base_url = get(BLOB_PUBLIC_BASE_URL_ENV)
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    var: BLOB_PUBLIC_BASE_URL_ENV,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            data_dir: get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()).into(),
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            tls,
            jwt_secret: get(AUTH_JWT_SECRET_ENV),
            jwt_issuer: get(AUTH_ISSUER_ENV),
            required_document_types,
            ledger: LedgerSettings {
                mode,
                evm,
                deadline: Duration::from_secs(deadline_secs),
                max_attempts,
            },
            blob_public_base_url,
            log_format,
        })
    }

    /// How long a `submitting` record marker blocks a second submission.
    pub fn in_flight_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ledger.deadline * 2)
            .unwrap_or_else(|_| chrono::Duration::minutes(2))
    }
}

fn parse_or<G, T>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_document_types(raw: &str) -> Result<BTreeSet<DocumentType>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            DocumentType::from_str(s).map_err(|e| ConfigError::Invalid {
                var: REQUIRED_DOCUMENT_TYPES_ENV,
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_with_empty_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.port, 8080);
        assert!(config.tls.is_none());
        assert_eq!(config.ledger.mode, LedgerMode::Memory);
        assert_eq!(config.ledger.deadline, Duration::from_secs(60));
        assert_eq!(config.ledger.max_attempts, 3);
        assert_eq!(config.required_document_types, DocumentType::default_required());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.in_flight_window(), chrono::Duration::seconds(120));
    }

    #[test]
    fn required_types_are_parsed() {
        let config =
            load(&[(REQUIRED_DOCUMENT_TYPES_ENV, "tax_certificate, export_license,")]).unwrap();
        assert_eq!(
            config.required_document_types,
            [DocumentType::TaxCertificate, DocumentType::ExportLicense]
                .into_iter()
                .collect()
        );
        assert!(load(&[(REQUIRED_DOCUMENT_TYPES_ENV, "passport")]).is_err());
    }

    #[test]
    fn evm_mode_requires_connection_settings() {
        let err = load(&[(LEDGER_MODE_ENV, "evm")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { var: LEDGER_RPC_URL_ENV, .. }));

        let config = load(&[
            (LEDGER_MODE_ENV, "evm"),
            (LEDGER_RPC_URL_ENV, "http://127.0.0.1:8545"),
            (LEDGER_REGISTRY_ADDRESS_ENV, "0x0000000000000000000000000000000000000001"),
            (LEDGER_SIGNER_KEY_PATH_ENV, "/keys/ledger.pem"),
        ])
        .unwrap();
        assert_eq!(config.ledger.mode, LedgerMode::Evm);
        assert!(config.ledger.evm.is_some());

        assert!(load(&[(LEDGER_MODE_ENV, "solana")]).is_err());
    }

    #[test]
    fn tls_paths_must_come_in_pairs() {
        assert!(load(&[(TLS_CERT_PATH_ENV, "/tls/cert.pem")]).is_err());
        let config = load(&[
            (TLS_CERT_PATH_ENV, "/tls/cert.pem"),
            (TLS_KEY_PATH_ENV, "/tls/key.pem"),
        ])
        .unwrap();
        assert!(config.tls.is_some());
    }

    #[test]
    fn invalid_numbers_and_urls_are_rejected() {
        assert!(load(&[(PORT_ENV, "eighty")]).is_err());
        assert!(load(&[(LEDGER_DEADLINE_SECS_ENV, "0")]).is_err());
        assert!(load(&[(BLOB_PUBLIC_BASE_URL_ENV, "not a url")]).is_err());
        assert!(load(&[(LOG_FORMAT_ENV, "json")]).is_ok_and(|c| c.log_format == LogFormat::Json));
    }
}
