//! Backing Store Module
//!
//! The contract the cache engine needs from the key-value store sitting
//! behind it: plain values with expiry, a conditional set used for locking,
//! named sorted indexes keyed by a numeric score, and memory introspection.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryBackend;

// == Store Error ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),
}

// == Backing Store Trait ==
/// Operations consumed from the backing store.
///
/// Values are opaque bytes. `set` stores a value without expiry, dropping
/// any TTL the key had; `expire` attaches one afterwards.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
    /// Atomically deletes `key` only while it still holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    /// Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
    /// Remaining TTL, or None for a missing key or a key without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
    /// Atomically stores `value` with `ttl` only if `key` is absent.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Inserts `member` or replaces its score.
    async fn index_upsert(&self, index: &str, member: &str, score: f64)
        -> Result<(), StoreError>;
    async fn index_remove(&self, index: &str, member: &str) -> Result<bool, StoreError>;
    async fn index_score(&self, index: &str, member: &str) -> Result<Option<f64>, StoreError>;
    /// Members with `low <= score <= high`, ascending by score.
    async fn index_range_by_score(
        &self,
        index: &str,
        low: f64,
        high: f64,
    ) -> Result<Vec<(String, f64)>, StoreError>;
    /// Removes members with `low <= score <= high`, returning how many went.
    async fn index_remove_range_by_score(
        &self,
        index: &str,
        low: f64,
        high: f64,
    ) -> Result<usize, StoreError>;
    async fn index_len(&self, index: &str) -> Result<usize, StoreError>;

    /// Bytes currently used by the store.
    async fn used_memory_bytes(&self) -> Result<u64, StoreError>;
}
