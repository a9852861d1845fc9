//! Repository Module
//!
//! The record-repository collaborator and the cache-aside layer in front of
//! it. Records are cached under `<prefix>::<id>`; every successful read
//! re-caches the record, which is what drives TTL adaptation for hot records.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheEngine, Priority};
use crate::error::Result;

// == Repository Trait ==
/// Persistent record storage keyed by numeric id.
#[async_trait]
pub trait Repository: Send + Sync {
    type Record: Send + Sync;

    async fn find_by_id(&self, id: u64) -> Result<Option<Self::Record>>;
    /// Inserts under a fresh id when `id` is None; returns the id used.
    async fn save(&self, id: Option<u64>, record: Self::Record) -> Result<u64>;
    async fn delete_by_id(&self, id: u64) -> Result<bool>;
    async fn find_all(&self) -> Result<Vec<(u64, Self::Record)>>;
}

// == In-Memory Repository ==
/// Repository backed by an ordered map; ids start at 1.
#[derive(Debug)]
pub struct InMemoryRepository<T> {
    records: Mutex<BTreeMap<u64, T>>,
    next_id: AtomicU64,
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> Repository for InMemoryRepository<T> {
    type Record = T;

    async fn find_by_id(&self, id: u64) -> Result<Option<T>> {
        Ok(self.records.lock().get(&id).cloned())
    }

    async fn save(&self, id: Option<u64>, record: T) -> Result<u64> {
        let id = match id {
            Some(id) => {
                self.next_id.fetch_max(id + 1, Ordering::SeqCst);
                id
            }
            None => self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        self.records.lock().insert(id, record);
        Ok(id)
    }

    async fn delete_by_id(&self, id: u64) -> Result<bool> {
        Ok(self.records.lock().remove(&id).is_some())
    }

    async fn find_all(&self) -> Result<Vec<(u64, T)>> {
        Ok(self
            .records
            .lock()
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect())
    }
}

// == Read-Through Cache ==
/// Cache-aside access to a repository.
pub struct ReadThroughCache<R> {
    engine: CacheEngine,
    repository: R,
    prefix: String,
    priority: Priority,
}

impl<R> ReadThroughCache<R>
where
    R: Repository,
    R::Record: Serialize + DeserializeOwned,
{
    /// Caches records of `repository` under `<prefix>::<id>` at MEDIUM priority.
    pub fn new(engine: CacheEngine, repository: R, prefix: impl Into<String>) -> Self {
        Self {
            engine,
            repository,
            prefix: prefix.into(),
            priority: Priority::Medium,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn cache_key(&self, id: u64) -> String {
        format!("{}::{}", self.prefix, id)
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Serves `id` from the cache, falling back to the repository, and
    /// re-caches whatever was found.
    pub async fn get(&self, id: u64) -> Result<Option<R::Record>> {
        let key = self.cache_key(id);
        let record = match self.engine.get_value::<R::Record>(&key).await? {
            Some(record) => record,
            None => match self.repository.find_by_id(id).await? {
                Some(record) => {
                    debug!(key = %key, "cache miss served from repository");
                    record
                }
                None => return Ok(None),
            },
        };

        match self.engine.cache(&key, &record, self.priority).await {
            Err(e) if e.is_contention() => {
                warn!(key = %key, error = %e, "skipped re-cache of a contended record");
            }
            other => other?,
        }
        Ok(Some(record))
    }

    /// Saves a new record without caching it; returns its id.
    pub async fn create(&self, record: R::Record) -> Result<u64> {
        self.repository.save(None, record).await
    }

    /// Saves over an existing record, then refreshes its cache entry.
    ///
    /// A cached entry gets the new payload with its TTL history intact; an
    /// uncached record is cached fresh. If the entry is locked by a running
    /// adaptation it is dropped instead, so later reads go to the repository.
    ///
    /// Returns `None` if `id` is unknown.
    pub async fn update(&self, id: u64, record: R::Record) -> Result<Option<u64>> {
        if self.repository.find_by_id(id).await?.is_none() {
            return Ok(None);
        }
        let payload = serde_json::to_value(&record)?;
        let id = self.repository.save(Some(id), record).await?;

        let key = self.cache_key(id);
        let refreshed = match self.engine.replace(&key, &payload).await {
            Ok(true) => Ok(()),
            Ok(false) => self.engine.cache(&key, &payload, self.priority).await,
            Err(e) => Err(e),
        };
        match refreshed {
            Err(e) if e.is_contention() => {
                warn!(key = %key, error = %e, "dropped contended cache entry after update");
                self.engine.delete_value(&key).await?;
            }
            other => other?,
        }
        Ok(Some(id))
    }

    /// Drops the cache entry, then the record. Returns false if `id` is unknown.
    pub async fn delete(&self, id: u64) -> Result<bool> {
        if self.repository.find_by_id(id).await?.is_none() {
            return Ok(false);
        }
        self.engine.delete_value(&self.cache_key(id)).await?;
        self.repository.delete_by_id(id).await
    }

    pub async fn list(&self) -> Result<Vec<(u64, R::Record)>> {
        self.repository.find_all().await
    }
}
