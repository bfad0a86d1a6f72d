//! Verification cache
//!
//! Keyed store of successful verifications. Records older than the validity
//! window are never returned.

use crate::{CacheScope, VerificationKey, VerificationRecord, VerifiedInstance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Verification cache contract. Implementations must not serialize
/// operations on different keys.
#[async_trait]
pub trait VerificationCache: Send + Sync {
    /// Valid record for `key`, if any
    async fn lookup(&self, key: &VerificationKey) -> CacheResult<Option<VerificationRecord>>;

    /// Write or overwrite the record for `key`
    async fn store(
        &self,
        key: &VerificationKey,
        instance: &VerifiedInstance,
        scope: CacheScope,
    ) -> CacheResult<VerificationRecord>;

    /// Force the next request for `key` to re-verify
    async fn invalidate(&self, key: &VerificationKey) -> CacheResult<()>;
}

/// In-process cache backed by a sharded map
pub struct InMemoryVerificationCache {
    records: DashMap<VerificationKey, VerificationRecord>,
    validity_window: chrono::Duration,
}

impl InMemoryVerificationCache {
    pub fn new(validity_window: Duration) -> Self {
        Self {
            records: DashMap::new(),
            validity_window: chrono::Duration::from_std(validity_window)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    fn is_fresh(&self, record: &VerificationRecord, now: DateTime<Utc>) -> bool {
        now - record.refreshed_at <= self.validity_window
    }

    /// Lookup at an explicit instant
    pub fn get_at(&self, key: &VerificationKey, now: DateTime<Utc>) -> Option<VerificationRecord> {
        if let Some(record) = self.records.get(key) {
            if self.is_fresh(&record, now) {
                return Some(record.clone());
            }
        } else {
            return None;
        }

        // Expired; drop it unless a concurrent store refreshed it meanwhile
        self.records
            .remove_if(key, |_, record| !self.is_fresh(record, now));
        None
    }

    /// Store at an explicit instant. Atomic per key.
    pub fn put_at(
        &self,
        key: &VerificationKey,
        instance: &VerifiedInstance,
        scope: CacheScope,
        now: DateTime<Utc>,
    ) -> VerificationRecord {
        let fresh = VerificationRecord {
            key: key.clone(),
            verified_at: now,
            refreshed_at: now,
            billing_account_id: instance.billing_account_id.clone(),
            registry_scoped: scope == CacheScope::RegistryOnly,
        };

        match self.records.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = match scope {
                    CacheScope::Full => fresh,
                    CacheScope::RegistryOnly => {
                        let previous = occupied.get();
                        VerificationRecord {
                            verified_at: previous.verified_at,
                            billing_account_id: previous
                                .billing_account_id
                                .clone()
                                .or(fresh.billing_account_id),
                            ..fresh
                        }
                    }
                };
                occupied.insert(record.clone());
                record
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh.clone());
                fresh
            }
        }
    }

    /// Drop every expired record, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, record| self.is_fresh(record, now));
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired verification records");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VerificationCache for InMemoryVerificationCache {
    async fn lookup(&self, key: &VerificationKey) -> CacheResult<Option<VerificationRecord>> {
        Ok(self.get_at(key, Utc::now()))
    }

    async fn store(
        &self,
        key: &VerificationKey,
        instance: &VerifiedInstance,
        scope: CacheScope,
    ) -> CacheResult<VerificationRecord> {
        Ok(self.put_at(key, instance, scope, Utc::now()))
    }

    async fn invalidate(&self, key: &VerificationKey) -> CacheResult<()> {
        self.records.remove(key);
        Ok(())
    }
}
