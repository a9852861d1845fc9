//! Cache Engine Module
//!
//! Fetch-or-populate cache over a `BackingStore`. New keys get a TTL from
//! their priority; re-caching a key adapts its TTL to how often it is being
//! cached. Every write keeps the expiration index in step with the entry.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::{
    CacheEntry, CacheStats, ExpirationIndex, KeyLock, Priority, StatsSnapshot, TtlPolicy,
    LOCK_SUFFIX, MAX_KEY_LENGTH,
};
use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::store::BackingStore;

// == Cache Engine ==
/// Adaptive-TTL cache engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct CacheEngine {
    store: Arc<dyn BackingStore>,
    index: ExpirationIndex,
    lock: KeyLock,
    policy: TtlPolicy,
    clock: SharedClock,
    stats: Arc<CacheStats>,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates an engine on the system clock.
    pub fn new(store: Arc<dyn BackingStore>, config: &Config) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates an engine whose timestamps come from `clock`.
    pub fn with_clock(store: Arc<dyn BackingStore>, config: &Config, clock: SharedClock) -> Self {
        Self {
            index: ExpirationIndex::new(store.clone()),
            lock: KeyLock::from_config(store.clone(), config),
            policy: TtlPolicy::from_config(config),
            store,
            clock,
            stats: Arc::new(CacheStats::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    pub fn index(&self) -> &ExpirationIndex {
        &self.index
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // == Cache ==
    /// Caches `value` under `key`, or adapts the entry already there.
    ///
    /// A new key gets the base TTL for `priority`. An existing key is adapted
    /// in place under the per-key lock: payload and priority stay as stored,
    /// only the TTL, index score and access metadata change. `value` is used
    /// for an existing key only if the entry vanishes before the lock is taken.
    ///
    /// # Errors
    /// - `Contention` if another adaptation of `key` holds the lock past the retry budget
    /// - `BackingStoreUnavailable` on any store failure
    pub async fn cache<V>(&self, key: &str, value: &V, priority: Priority) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        validate_key(key)?;
        let data = serde_json::to_value(value)?;

        if self.store.exists(key).await? {
            let outcome = self.adapt(key, data, priority).await;
            self.track_contention(outcome)
        } else {
            self.insert(key, data, priority).await
        }
    }

    async fn insert(&self, key: &str, data: Value, priority: Priority) -> Result<()> {
        let now = self.clock.now_ms();
        let entry = CacheEntry::new(data, priority, now);
        let ttl = self.policy.base_ttl(priority);

        self.write_entry(key, &entry, ttl, now).await?;
        self.stats.record_insert();
        debug!(key, %priority, ttl_secs = ttl.as_secs(), "cached new entry");
        Ok(())
    }

    // == Adapt ==
    /// `fallback` is cached only when the entry is gone once the lock is held.
    async fn adapt(&self, key: &str, fallback: Value, priority: Priority) -> Result<()> {
        self.lock
            .with_lock(key, || async move {
                // Re-read under the lock; the pre-lock copy may be stale
                let Some(bytes) = self.store.get(key).await? else {
                    debug!(key, "entry vanished before adaptation, caching fresh");
                    return self.insert(key, fallback, priority).await;
                };
                let mut entry: CacheEntry<Value> = CacheEntry::from_bytes(&bytes)?;
                if entry.metadata.priority != priority {
                    trace!(
                        key,
                        requested = %priority,
                        kept = %entry.metadata.priority,
                        "priority is fixed at creation"
                    );
                }

                let now = self.clock.now_ms();
                let ratio = self.policy.frequency_ratio(&entry.metadata, now);
                let ttl = self.policy.adapted_ttl(entry.metadata.priority, ratio);

                entry.metadata.record_access(now);
                self.write_entry(key, &entry, ttl, now).await?;

                self.stats.record_adaptation();
                debug!(
                    key,
                    ratio,
                    ttl_secs = ttl.as_secs(),
                    usage_count = entry.metadata.usage_count,
                    "adapted entry ttl"
                );
                Ok(())
            })
            .await
    }

    // == Replace ==
    /// Swaps the payload of a cached entry for `value`.
    ///
    /// Metadata, remaining TTL and the index record are kept as they are.
    ///
    /// # Returns
    /// `false` if `key` is not cached, in which case nothing is written.
    ///
    /// # Errors
    /// - `Contention` if an adaptation of `key` holds the lock past the retry budget
    /// - `BackingStoreUnavailable` on any store failure
    pub async fn replace<V>(&self, key: &str, value: &V) -> Result<bool>
    where
        V: Serialize + ?Sized,
    {
        validate_key(key)?;
        let data = serde_json::to_value(value)?;

        let outcome = self
            .lock
            .with_lock(key, || async move {
                let Some(bytes) = self.store.get(key).await? else {
                    return Ok(false);
                };
                let remaining = self.store.ttl(key).await?;
                let mut entry: CacheEntry<Value> = CacheEntry::from_bytes(&bytes)?;
                entry.data = data;

                self.store.set(key, entry.to_bytes()?).await?;
                if let Some(remaining) = remaining {
                    self.store.expire(key, remaining).await?;
                }
                debug!(key, "replaced cached payload");
                Ok(true)
            })
            .await;
        self.track_contention(outcome)
    }

    fn track_contention<T>(&self, outcome: Result<T>) -> Result<T> {
        if matches!(&outcome, Err(e) if e.is_contention()) {
            self.stats.record_contention();
        }
        outcome
    }

    /// Persists `entry`, applies `ttl`, then moves its index record to `now + ttl`.
    async fn write_entry(
        &self,
        key: &str,
        entry: &CacheEntry<Value>,
        ttl: Duration,
        now_ms: u64,
    ) -> Result<()> {
        self.store.set(key, entry.to_bytes()?).await?;
        self.store.expire(key, ttl).await?;
        self.index.upsert(key, now_ms / 1000 + ttl.as_secs()).await
    }

    // == Get Value ==
    /// Returns the payload for `key`, or `None` on a miss.
    ///
    /// Never touches metadata or TTL.
    pub async fn get_value<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.entry(key).await? {
            Some(entry) => {
                self.stats.record_hit();
                Ok(Some(serde_json::from_value(entry.data)?))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Returns the whole stored entry, metadata included.
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry<Value>>> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(Some(CacheEntry::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remaining TTL of `key` as seen by the store.
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.store.ttl(key).await?)
    }

    // == Delete Value ==
    /// Removes `key` and its index record.
    ///
    /// Deleting an absent key is a no-op; returns whether an entry was removed.
    pub async fn delete_value(&self, key: &str) -> Result<bool> {
        let removed = self.store.delete(key).await?;
        self.index.remove(key).await?;
        Ok(removed)
    }

    /// Deletes `key` on behalf of the eviction scheduler.
    ///
    /// Only an entry that was still live counts as an eviction; its index
    /// record goes either way.
    pub async fn evict(&self, key: &str) -> Result<bool> {
        let removed = self.delete_value(key).await?;
        if removed {
            self.stats.record_evictions(1);
        }
        debug!(key, removed, "evicted entry");
        Ok(removed)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.ends_with(LOCK_SUFFIX) {
        return Err(CacheError::InvalidRequest(format!(
            "Key cannot end with '{}'",
            LOCK_SUFFIX
        )));
    }
    Ok(())
}
