// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state and startup wiring.

use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, LedgerMode, RECORD_CACHE_CAPACITY, RECORD_CACHE_TTL};
use crate::ledger::{
    signing::{wallet_from_pem_file, SignerError},
    AttestationLedger, EvmAttestationLedger, InMemoryLedger, LedgerAdapter, LedgerAdapterConfig,
    LedgerError, RetryPolicy,
};
use crate::pipeline::{AttestationPipeline, DocumentIntake, PersistenceCoordinator, SessionRegistry};
use crate::storage::{
    AuditLog, BlobError, BlobStore, CachedRecordStore, FsBlobStore, RecordCache, RecordStore,
    RecordStoreError, RedbRecordStore, StoragePaths,
};

/// Bearer token verification settings.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// HS256 key; `None` means structure-only decode in `dev` builds
    pub decoding_key: Option<DecodingKey>,
    /// Expected `iss` claim
    pub issuer: Option<String>,
}

impl AuthConfig {
    pub fn with_secret(secret: &str, issuer: Option<String>) -> Self {
        Self {
            decoding_key: Some(DecodingKey::from_secret(secret.as_bytes())),
            issuer,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        match &config.jwt_secret {
            Some(secret) => Self::with_secret(secret, config.jwt_issuer.clone()),
            None => {
                tracing::warn!(
                    "AUTH_JWT_SECRET not set; bearer tokens are only accepted in dev builds"
                );
                Self {
                    decoding_key: None,
                    issuer: config.jwt_issuer.clone(),
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("blob storage: {0}")]
    Blob(#[from] BlobError),

    #[error("record store: {0}")]
    Records(#[from] RecordStoreError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("ledger signer: {0}")]
    Signer(#[from] SignerError),

    #[error("configuration: {0}")]
    Config(String),
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AttestationPipeline>,
    /// Cached record store; the same instance the pipeline writes through
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub auth_config: AuthConfig,
}

impl AppState {
    pub fn new(
        pipeline: Arc<AttestationPipeline>,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            pipeline,
            records,
            blobs,
            auth_config,
        }
    }

    /// Open storage, pick the ledger backend and assemble the pipeline.
    pub fn from_config(config: &AppConfig, shutdown: CancellationToken) -> Result<Self, InitError> {
        let paths = StoragePaths::new(&config.data_dir);

        let mut blob_store = FsBlobStore::open(paths.clone())?;
        if let Some(base) = &config.blob_public_base_url {
            blob_store = blob_store.with_public_base_url(base.clone());
        }
        let blobs: Arc<dyn BlobStore> = Arc::new(blob_store);

        let records: Arc<dyn RecordStore> = Arc::new(CachedRecordStore::new(
            RedbRecordStore::open(&paths.records_db())?,
            RecordCache::new(RECORD_CACHE_CAPACITY, RECORD_CACHE_TTL),
        ));
        let audit = Arc::new(AuditLog::new(paths));

        let ledger = build_ledger(config)?;
        let retry = RetryPolicy::new(config.ledger.max_attempts, RetryPolicy::default().base_delay);
        let adapter = LedgerAdapter::new(
            ledger,
            LedgerAdapterConfig {
                deadline: config.ledger.deadline,
                retry,
                ..LedgerAdapterConfig::default()
            },
            shutdown,
        );

        let coordinator = PersistenceCoordinator::new(
            records.clone(),
            adapter,
            audit.clone(),
            retry,
            config.in_flight_window(),
        );
        let pipeline = AttestationPipeline::new(
            SessionRegistry::new(config.required_document_types.clone()),
            DocumentIntake::new(blobs.clone(), retry),
            coordinator,
            records.clone(),
            audit,
        );

        tracing::info!(
            data_dir = %config.data_dir.display(),
            ledger = pipeline.ledger_backend(),
            required_documents = config.required_document_types.len(),
            "Attestation pipeline initialized"
        );

        Ok(Self::new(
            Arc::new(pipeline),
            records,
            blobs,
            AuthConfig::from_config(config),
        ))
    }
}

fn build_ledger(config: &AppConfig) -> Result<Arc<dyn AttestationLedger>, InitError> {
    match config.ledger.mode {
        LedgerMode::Memory => {
            tracing::warn!("Using in-memory ledger; attestations do not survive restarts");
            Ok(Arc::new(InMemoryLedger::new()))
        }
        LedgerMode::Evm => {
            let evm = config
                .ledger
                .evm
                .as_ref()
                .ok_or_else(|| InitError::Config("evm ledger settings missing".to_string()))?;
            let wallet = wallet_from_pem_file(&evm.signer_key_path)?;
            let ledger =
                EvmAttestationLedger::connect(&evm.rpc_url, &evm.registry_address, wallet)?;
            tracing::info!(
                registry = %ledger.registry(),
                rpc = %evm.rpc_url,
                "Using EVM attestation ledger"
            );
            Ok(Arc::new(ledger))
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State over a test pipeline harness.
    pub(crate) fn for_pipeline(
        t: &crate::pipeline::test_support::TestPipeline,
        auth_config: AuthConfig,
    ) -> Self {
        let blobs = FsBlobStore::open(StoragePaths::new(t.dir.path())).unwrap();
        Self::new(t.pipeline.clone(), t.store.clone(), Arc::new(blobs), auth_config)
    }
}
