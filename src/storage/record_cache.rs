// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for provider record lookups.
//!
//! `GET /v1/providers/{owner}` is the hot read path (marketplace pages poll a
//! provider's status). [`CachedRecordStore`] wraps any [`RecordStore`], serves
//! `get` from the cache and invalidates the owner's entry on every write.
//!
//! A miss fills the cache only if no invalidation landed while the row was
//! being read, so a concurrent write never leaves a stale row behind.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::record_db::{AttestationDraft, BeginOutcome, RecordResult, RecordStore};
use crate::models::{
    BuyerProfile, LedgerReference, OwnerIdentity, ProfileRole, ProviderRecord, ProviderStatus,
};

/// Cached entry: record + insertion timestamp.
struct CacheEntry {
    record: ProviderRecord,
    inserted_at: Instant,
}

/// In-process LRU cache for provider records keyed by owner identity.
pub struct RecordCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    /// Bumped on every invalidation, always under the `cache` lock.
    generation: AtomicU64,
}

impl RecordCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
            generation: AtomicU64::new(0),
        }
    }

    /// Returns `None` if not cached or expired.
    pub fn get(&self, owner: &str) -> Option<ProviderRecord> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(owner) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.record.clone());
            }
            // Expired, drop it
            cache.pop(owner);
        }
        None
    }

    pub fn put(&self, record: &ProviderRecord) {
        if let Ok(mut cache) = self.cache.lock() {
            Self::insert(&mut cache, record);
        }
    }

    /// Current invalidation generation; pair with [`RecordCache::put_if_current`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cache `record` unless an invalidation happened since `observed`.
    pub fn put_if_current(&self, record: &ProviderRecord, observed: u64) -> bool {
        let Ok(mut cache) = self.cache.lock() else {
            return false;
        };
        if self.generation.load(Ordering::Acquire) != observed {
            return false;
        }
        Self::insert(&mut cache, record);
        true
    }

    pub fn invalidate(&self, owner: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            self.generation.fetch_add(1, Ordering::AcqRel);
            cache.pop(owner);
        }
    }

    fn insert(cache: &mut LruCache<String, CacheEntry>, record: &ProviderRecord) {
        cache.put(
            record.owner_identity.to_string(),
            CacheEntry {
                record: record.clone(),
                inserted_at: Instant::now(),
            },
        );
    }
}

/// Read-through cache in front of a [`RecordStore`].
pub struct CachedRecordStore<S> {
    inner: S,
    cache: RecordCache,
}

impl<S: RecordStore> CachedRecordStore<S> {
    pub fn new(inner: S, cache: RecordCache) -> Self {
        Self { inner, cache }
    }

    fn refresh<T>(&self, owner: &OwnerIdentity, result: RecordResult<T>) -> RecordResult<T> {
        // Failed writes invalidate too; the commit may have landed.
        self.cache.invalidate(owner.as_str());
        result
    }
}

impl<S: RecordStore> RecordStore for CachedRecordStore<S> {
    fn get(&self, owner: &OwnerIdentity) -> RecordResult<Option<ProviderRecord>> {
        if let Some(record) = self.cache.get(owner.as_str()) {
            return Ok(Some(record));
        }
        let observed = self.cache.generation();
        let record = self.inner.get(owner)?;
        if let Some(record) = &record {
            self.cache.put_if_current(record, observed);
        }
        Ok(record)
    }

    fn begin_attestation(
        &self,
        draft: &AttestationDraft,
        in_flight_window: chrono::Duration,
    ) -> RecordResult<BeginOutcome> {
        let result = self.inner.begin_attestation(draft, in_flight_window);
        self.refresh(&draft.owner, result)
    }

    fn mark_anchored(
        &self,
        owner: &OwnerIdentity,
        reference: &LedgerReference,
    ) -> RecordResult<ProviderRecord> {
        let result = self.inner.mark_anchored(owner, reference);
        self.refresh(owner, result)
    }

    fn mark_attestation_failed(
        &self,
        owner: &OwnerIdentity,
        reason: &str,
        retryable: bool,
    ) -> RecordResult<ProviderRecord> {
        let result = self.inner.mark_attestation_failed(owner, reason, retryable);
        self.refresh(owner, result)
    }

    fn set_review_status(
        &self,
        owner: &OwnerIdentity,
        next: ProviderStatus,
    ) -> RecordResult<ProviderRecord> {
        let result = self.inner.set_review_status(owner, next);
        self.refresh(owner, result)
    }

    fn resolve_role(&self, owner: &OwnerIdentity) -> RecordResult<ProfileRole> {
        self.inner.resolve_role(owner)
    }

    fn insert_buyer_profile(&self, profile: &BuyerProfile) -> RecordResult<()> {
        self.inner.insert_buyer_profile(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttestationMarker;
    use crate::storage::record_db::RedbRecordStore;
    use chrono::Utc;

    fn sample_record(owner: &str) -> ProviderRecord {
        ProviderRecord {
            id: uuid::Uuid::new_v4(),
            owner_identity: OwnerIdentity::parse(owner).unwrap(),
            status: ProviderStatus::Pending,
            ledger_reference: None,
            attestation: AttestationMarker::Unanchored,
            combined_hash: "c1".to_string(),
            document_count: 0,
            documents: Vec::new(),
            details: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cache_put_and_get() {
        let cache = RecordCache::new(10, Duration::from_secs(300));
        assert!(cache.get("o1").is_none());

        cache.put(&sample_record("o1"));
        assert_eq!(cache.get("o1").unwrap().combined_hash, "c1");
    }

    #[test]
    fn cache_invalidate() {
        let cache = RecordCache::new(10, Duration::from_secs(300));
        cache.put(&sample_record("o1"));
        cache.invalidate("o1");
        assert!(cache.get("o1").is_none());
    }

    #[test]
    fn fill_is_skipped_when_invalidated_during_read() {
        let cache = RecordCache::new(10, Duration::from_secs(300));
        let observed = cache.generation();
        let stale = sample_record("o1");

        // A write commits and invalidates between the miss and the fill.
        cache.invalidate("o1");

        assert!(!cache.put_if_current(&stale, observed));
        assert!(cache.get("o1").is_none());

        let observed = cache.generation();
        assert!(cache.put_if_current(&stale, observed));
        assert!(cache.get("o1").is_some());
    }

    #[test]
    fn cache_ttl_expiry() {
        let cache = RecordCache::new(10, Duration::from_millis(1));
        cache.put(&sample_record("o1"));

        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("o1").is_none());
    }

    #[test]
    fn writes_through_wrapper_invalidate_cached_record() {
        let dir = tempfile::tempdir().unwrap();
        let inner = RedbRecordStore::open(&dir.path().join("providers.redb")).unwrap();
        let store = CachedRecordStore::new(inner, RecordCache::new(10, Duration::from_secs(300)));
        let owner = OwnerIdentity::parse("o1").unwrap();

        store
            .begin_attestation(
                &AttestationDraft {
                    owner: owner.clone(),
                    combined_hash: "c1".to_string(),
                    document_count: 0,
                    documents: Vec::new(),
                    details: None,
                },
                chrono::Duration::zero(),
            )
            .unwrap();

        let first = store.get(&owner).unwrap().unwrap();
        assert!(first.ledger_reference.is_none());

        store
            .mark_anchored(
                &owner,
                &LedgerReference {
                    transaction: "0xabc".to_string(),
                    block_number: None,
                    confirmed_at: Utc::now(),
                },
            )
            .unwrap();

        let second = store.get(&owner).unwrap().unwrap();
        assert_eq!(second.ledger_reference.unwrap().transaction, "0xabc");
    }
}
