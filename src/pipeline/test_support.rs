// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test doubles shared by the pipeline and API tests.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::composer::content_hash;
use super::coordinator::PersistenceCoordinator;
use super::intake::DocumentIntake;
use super::session::SessionRegistry;
use super::AttestationPipeline;
use crate::auth::{IdentityContext, Role};
use crate::ledger::{
    AttestationLedger, Confirmation, InMemoryLedger, LedgerAdapter, LedgerAdapterConfig,
    LedgerError, RetryPolicy,
};
use crate::models::{
    BuyerProfile, ContentFormat, DocumentDescriptor, DocumentType, LedgerReference, OwnerIdentity,
    ProfileRole, ProviderRecord, ProviderStatus,
};
use crate::storage::{
    AttestationDraft, AuditLog, BeginOutcome, BlobStore, FsBlobStore, RecordResult, RecordStore,
    RecordStoreError, RedbRecordStore, StoragePaths,
};

pub(crate) fn descriptor(bytes: &[u8]) -> DocumentDescriptor {
    let hash = content_hash(bytes);
    DocumentDescriptor {
        id: Uuid::new_v4(),
        document_type: DocumentType::TaxCertificate,
        display_name: "doc.pdf".to_string(),
        storage_locator: format!("mem://{hash}"),
        content_hash: hash,
        content_format: ContentFormat::Pdf,
        size_bytes: bytes.len() as u64,
        uploaded_at: Utc::now(),
        metadata: BTreeMap::new(),
    }
}

pub(crate) fn fast_adapter(ledger: Arc<dyn AttestationLedger>) -> LedgerAdapter {
    LedgerAdapter::new(
        ledger,
        LedgerAdapterConfig {
            deadline: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
        },
        CancellationToken::new(),
    )
}

/// In-memory ledger with scripted submit failures and unconfirmed submissions.
#[derive(Default)]
pub(crate) struct ScriptedLedger {
    pub inner: InMemoryLedger,
    pub submit_calls: AtomicU32,
    failures: Mutex<VecDeque<LedgerError>>,
    /// Submissions left that will never confirm
    unconfirmed: AtomicU32,
    stuck: Mutex<HashSet<String>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: LedgerError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// The next `n` submissions are accepted but stay pending forever.
    pub fn never_confirm_next(&self, n: u32) {
        self.unconfirmed.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl AttestationLedger for ScriptedLedger {
    async fn submit_commitment(
        &self,
        owner: &OwnerIdentity,
        payload: &[u8],
    ) -> Result<String, LedgerError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let tx = self.inner.submit_commitment(owner, payload).await?;
        let stuck = self
            .unconfirmed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stuck {
            self.stuck.lock().unwrap().insert(tx.clone());
        }
        Ok(tx)
    }

    async fn confirmation(&self, transaction: &str) -> Result<Confirmation, LedgerError> {
        if self.stuck.lock().unwrap().contains(transaction) {
            return Ok(Confirmation::Pending);
        }
        self.inner.confirmation(transaction).await
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Redb store that can be told to fail specific writes with a transient error.
pub(crate) struct FailingRecordStore {
    inner: RedbRecordStore,
    pub fail_begin: AtomicU32,
    pub fail_anchor: AtomicU32,
}

impl FailingRecordStore {
    pub fn open(dir: &Path) -> Self {
        Self {
            inner: RedbRecordStore::open(&dir.join("providers.redb")).unwrap(),
            fail_begin: AtomicU32::new(0),
            fail_anchor: AtomicU32::new(0),
        }
    }

    fn trip(counter: &AtomicU32) -> RecordResult<()> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(RecordStoreError::Unavailable("injected outage".to_string())),
            Err(_) => Ok(()),
        }
    }
}

impl RecordStore for FailingRecordStore {
    fn get(&self, owner: &OwnerIdentity) -> RecordResult<Option<ProviderRecord>> {
        self.inner.get(owner)
    }

    fn begin_attestation(
        &self,
        draft: &AttestationDraft,
        in_flight_window: chrono::Duration,
    ) -> RecordResult<BeginOutcome> {
        Self::trip(&self.fail_begin)?;
        self.inner.begin_attestation(draft, in_flight_window)
    }

    fn mark_anchored(
        &self,
        owner: &OwnerIdentity,
        reference: &LedgerReference,
    ) -> RecordResult<ProviderRecord> {
        Self::trip(&self.fail_anchor)?;
        self.inner.mark_anchored(owner, reference)
    }

    fn mark_attestation_failed(
        &self,
        owner: &OwnerIdentity,
        reason: &str,
        retryable: bool,
    ) -> RecordResult<ProviderRecord> {
        self.inner.mark_attestation_failed(owner, reason, retryable)
    }

    fn set_review_status(
        &self,
        owner: &OwnerIdentity,
        next: ProviderStatus,
    ) -> RecordResult<ProviderRecord> {
        self.inner.set_review_status(owner, next)
    }

    fn resolve_role(&self, owner: &OwnerIdentity) -> RecordResult<ProfileRole> {
        self.inner.resolve_role(owner)
    }

    fn insert_buyer_profile(&self, profile: &BuyerProfile) -> RecordResult<()> {
        self.inner.insert_buyer_profile(profile)
    }
}

pub(crate) fn client(owner: &str) -> IdentityContext {
    IdentityContext::new(
        OwnerIdentity::parse(owner).unwrap(),
        Role::Client,
        ProfileRole::Unregistered,
    )
}

pub(crate) fn reviewer(owner: &str) -> IdentityContext {
    IdentityContext::new(
        OwnerIdentity::parse(owner).unwrap(),
        Role::Reviewer,
        ProfileRole::Unregistered,
    )
}

/// Pipeline wired to a temp directory, a scripted ledger and a failable store.
pub(crate) struct TestPipeline {
    pub dir: tempfile::TempDir,
    pub ledger: Arc<ScriptedLedger>,
    pub store: Arc<FailingRecordStore>,
    pub audit: Arc<AuditLog>,
    pub pipeline: Arc<AttestationPipeline>,
}

pub(crate) fn test_pipeline(required: BTreeSet<DocumentType>) -> TestPipeline {
    test_pipeline_with_blobs(required, None)
}

pub(crate) fn test_pipeline_with_blobs(
    required: BTreeSet<DocumentType>,
    blobs: Option<Arc<dyn BlobStore>>,
) -> TestPipeline {
    let dir = tempfile::tempdir().unwrap();
    let paths = StoragePaths::new(dir.path());
    let blobs = blobs.unwrap_or_else(|| {
        Arc::new(FsBlobStore::open(paths.clone()).unwrap()) as Arc<dyn BlobStore>
    });
    let ledger = Arc::new(ScriptedLedger::new());
    let store = Arc::new(FailingRecordStore::open(dir.path()));
    let audit = Arc::new(AuditLog::new(paths));
    let retry = RetryPolicy::new(3, Duration::from_millis(1));

    let coordinator = PersistenceCoordinator::new(
        store.clone(),
        fast_adapter(ledger.clone()),
        audit.clone(),
        retry,
        chrono::Duration::seconds(5),
    );
    let pipeline = AttestationPipeline::new(
        SessionRegistry::new(required),
        DocumentIntake::new(blobs, retry),
        coordinator,
        store.clone(),
        audit.clone(),
    );

    TestPipeline {
        dir,
        ledger,
        store,
        audit,
        pipeline: Arc::new(pipeline),
    }
}
