//! In-Memory Backend
//!
//! A process-local `BackingStore`. Values expire passively: an expired value
//! is dropped the next time anything touches it, the way a store's own TTL
//! fires without telling its clients.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;

use super::{BackingStore, StoreError};
use crate::clock::{SharedClock, SystemClock};

/// Bytes accounted per index member for its score.
const INDEX_SCORE_BYTES: u64 = 8;

#[derive(Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    /// Unix milliseconds, None = no expiration
    expires_at_ms: Option<u64>,
}

impl StoredValue {
    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(expires) if now_ms >= expires)
    }
}

/// Score-ordered set with O(log n) member lookup.
#[derive(Debug, Default)]
struct SortedIndex {
    scores: HashMap<String, OrderedFloat<f64>>,
    ordered: BTreeSet<(OrderedFloat<f64>, String)>,
}

impl SortedIndex {
    fn upsert(&mut self, member: &str, score: f64) {
        let score = OrderedFloat(score);
        if let Some(previous) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(previous, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn range(&self, low: f64, high: f64) -> Vec<(String, f64)> {
        self.ordered
            .range((OrderedFloat(low), String::new())..)
            .take_while(|(score, _)| score.0 <= high)
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    fn footprint(&self) -> u64 {
        self.scores
            .keys()
            .map(|member| member.len() as u64 + INDEX_SCORE_BYTES)
            .sum()
    }
}

// == Memory Backend ==
/// Thread-safe in-memory backing store.
#[derive(Debug)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, StoredValue>>,
    indexes: Mutex<HashMap<String, SortedIndex>>,
    clock: SharedClock,
    available: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty backend on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty backend whose expiry follows `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            indexes: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulates an outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live values, lock records included.
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        let mut values = self.values.lock();
        values.retain(|_, v| !v.is_expired(now));
        values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "in-memory backend is offline".to_string(),
            ))
        }
    }

    /// Runs `f` on the live value for `key`, dropping it first if expired.
    fn with_live<T>(&self, key: &str, f: impl FnOnce(Option<&mut StoredValue>) -> T) -> T {
        let now = self.clock.now_ms();
        let mut values = self.values.lock();
        if values.get(key).is_some_and(|v| v.is_expired(now)) {
            values.remove(key);
        }
        f(values.get_mut(key))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        Ok(self.with_live(key, |v| v.map(|v| v.bytes.clone())))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.check_available()?;
        self.values.lock().insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at_ms: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        Ok(self
            .values
            .lock()
            .remove(key)
            .is_some_and(|v| !v.is_expired(now)))
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut values = self.values.lock();
        match values.get(key) {
            Some(v) if !v.is_expired(now) && v.bytes == expected => {
                values.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.with_live(key, |v| v.is_some()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_available()?;
        let expires_at = self.clock.now_ms() + ttl.as_millis() as u64;
        Ok(self.with_live(key, |v| match v {
            Some(v) => {
                v.expires_at_ms = Some(expires_at);
                true
            }
            None => false,
        }))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        Ok(self.with_live(key, |v| {
            v.and_then(|v| v.expires_at_ms)
                .map(|expires| Duration::from_millis(expires.saturating_sub(now)))
        }))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let mut values = self.values.lock();
        if values.get(key).is_some_and(|v| !v.is_expired(now)) {
            return Ok(false);
        }
        values.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at_ms: Some(now + ttl.as_millis() as u64),
            },
        );
        Ok(true)
    }

    async fn index_upsert(
        &self,
        index: &str,
        member: &str,
        score: f64,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.indexes
            .lock()
            .entry(index.to_string())
            .or_default()
            .upsert(member, score);
        Ok(())
    }

    async fn index_remove(&self, index: &str, member: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self
            .indexes
            .lock()
            .get_mut(index)
            .is_some_and(|idx| idx.remove(member)))
    }

    async fn index_score(&self, index: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.check_available()?;
        Ok(self
            .indexes
            .lock()
            .get(index)
            .and_then(|idx| idx.scores.get(member))
            .map(|score| score.0))
    }

    async fn index_range_by_score(
        &self,
        index: &str,
        low: f64,
        high: f64,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.check_available()?;
        Ok(self
            .indexes
            .lock()
            .get(index)
            .map(|idx| idx.range(low, high))
            .unwrap_or_default())
    }

    async fn index_remove_range_by_score(
        &self,
        index: &str,
        low: f64,
        high: f64,
    ) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut indexes = self.indexes.lock();
        let Some(idx) = indexes.get_mut(index) else {
            return Ok(0);
        };
        let doomed = idx.range(low, high);
        for (member, _) in &doomed {
            idx.remove(member);
        }
        Ok(doomed.len())
    }

    async fn index_len(&self, index: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        Ok(self
            .indexes
            .lock()
            .get(index)
            .map_or(0, |idx| idx.scores.len()))
    }

    async fn used_memory_bytes(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        let now = self.clock.now_ms();
        let values: u64 = {
            let mut values = self.values.lock();
            values.retain(|_, v| !v.is_expired(now));
            values
                .iter()
                .map(|(key, v)| (key.len() + v.bytes.len()) as u64)
                .sum()
        };
        let indexes: u64 = self.indexes.lock().values().map(SortedIndex::footprint).sum();
        Ok(values + indexes)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn backend() -> (MemoryBackend, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        (MemoryBackend::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let (store, _) = backend();

        store.set("k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_expire_passively() {
        let (store, clock) = backend();

        store.set("k", b"v".to_vec()).await.unwrap();
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());
        assert_eq!(
            store.ttl("k").await.unwrap(),
            Some(Duration::from_secs(10))
        );

        clock.advance(Duration::from_secs(10));
        assert!(!store.exists("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_clears_ttl() {
        let (store, _) = backend();

        store.set("k", b"v1".to_vec()).await.unwrap();
        store.expire("k", Duration::from_secs(10)).await.unwrap();
        store.set("k", b"v2".to_vec()).await.unwrap();

        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let (store, _) = backend();
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_honors_expiry() {
        let (store, clock) = backend();
        let ttl = Duration::from_secs(10);

        assert!(store.set_if_absent("lock", b"1".to_vec(), ttl).await.unwrap());
        assert!(!store.set_if_absent("lock", b"1".to_vec(), ttl).await.unwrap());

        clock.advance(ttl);
        assert!(store.set_if_absent("lock", b"1".to_vec(), ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals_checks_value() {
        let (store, clock) = backend();
        let ttl = Duration::from_secs(10);
        store.set_if_absent("lock", b"a".to_vec(), ttl).await.unwrap();

        assert!(!store.delete_if_equals("lock", b"b").await.unwrap());
        assert!(store.exists("lock").await.unwrap());
        assert!(store.delete_if_equals("lock", b"a").await.unwrap());
        assert!(!store.exists("lock").await.unwrap());

        store.set_if_absent("lock", b"a".to_vec(), ttl).await.unwrap();
        clock.advance(ttl);
        assert!(!store.delete_if_equals("lock", b"a").await.unwrap());
    }

    #[tokio::test]
    async fn test_index_upsert_replaces_score() {
        let (store, _) = backend();

        store.index_upsert("idx", "a", 10.0).await.unwrap();
        store.index_upsert("idx", "b", 5.0).await.unwrap();
        store.index_upsert("idx", "a", 1.0).await.unwrap();

        assert_eq!(store.index_len("idx").await.unwrap(), 2);
        assert_eq!(store.index_score("idx", "a").await.unwrap(), Some(1.0));
        let range = store
            .index_range_by_score("idx", f64::NEG_INFINITY, f64::INFINITY)
            .await
            .unwrap();
        assert_eq!(
            range,
            vec![("a".to_string(), 1.0), ("b".to_string(), 5.0)]
        );
    }

    #[tokio::test]
    async fn test_index_range_bounds_are_inclusive() {
        let (store, _) = backend();
        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            store.index_upsert("idx", member, score).await.unwrap();
        }

        let range = store.index_range_by_score("idx", 2.0, 3.0).await.unwrap();
        let members: Vec<_> = range.into_iter().map(|(m, _)| m).collect();
        assert_eq!(members, vec!["b", "c"]);

        assert_eq!(
            store.index_remove_range_by_score("idx", 0.0, 2.0).await.unwrap(),
            2
        );
        assert_eq!(store.index_len("idx").await.unwrap(), 2);
        assert!(store.index_remove("idx", "c").await.unwrap());
        assert!(!store.index_remove("idx", "c").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_index_is_empty() {
        let (store, _) = backend();
        assert_eq!(store.index_len("nope").await.unwrap(), 0);
        assert!(store
            .index_range_by_score("nope", 0.0, 10.0)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.index_remove_range_by_score("nope", 0.0, 10.0).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_used_memory_tracks_live_data() {
        let (store, clock) = backend();

        store.set("key", vec![0u8; 97]).await.unwrap();
        store.index_upsert("idx", "key", 1.0).await.unwrap();
        assert_eq!(store.used_memory_bytes().await.unwrap(), 100 + 3 + 8);

        store.expire("key", Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.used_memory_bytes().await.unwrap(), 3 + 8);
    }

    #[tokio::test]
    async fn test_offline_backend_fails_every_call() {
        let (store, _) = backend();
        store.set_available(false);

        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.used_memory_bytes().await.is_err());
        assert!(store.index_upsert("idx", "k", 1.0).await.is_err());

        store.set_available(true);
        assert!(store.get("k").await.unwrap().is_none());
    }
}
