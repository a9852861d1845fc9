//! Expiration Index Module
//!
//! Secondary sorted structure holding one `(key, expires_at)` record per live
//! entry, scored in Unix seconds. Eviction scans read a snapshot of it and
//! only then delete.

use std::sync::Arc;

use crate::error::Result;
use crate::store::BackingStore;

/// Name of the sorted index inside the backing store.
pub const EXPIRATION_INDEX: &str = "cache:expirations";

/// One index record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub key: String,
    /// Absolute expiry (Unix seconds)
    pub expires_at: u64,
}

// == Expiration Index ==
#[derive(Clone)]
pub struct ExpirationIndex {
    store: Arc<dyn BackingStore>,
    name: String,
}

impl ExpirationIndex {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self::named(store, EXPIRATION_INDEX)
    }

    pub fn named(store: Arc<dyn BackingStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Sets the record for `key`, replacing any earlier one.
    pub async fn upsert(&self, key: &str, expires_at: u64) -> Result<()> {
        self.store
            .index_upsert(&self.name, key, expires_at as f64)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.store.index_remove(&self.name, key).await?)
    }

    pub async fn expires_at(&self, key: &str) -> Result<Option<u64>> {
        let score = self.store.index_score(&self.name, key).await?;
        Ok(score.map(|s| s as u64))
    }

    /// Keys with `low <= expires_at <= high`, earliest-expiring first.
    pub async fn range_by_score(&self, low: u64, high: u64) -> Result<Vec<String>> {
        let records = self.records_between(low, high).await?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }

    /// Every record, earliest-expiring first.
    pub async fn records(&self) -> Result<Vec<IndexRecord>> {
        self.records_between(0, u64::MAX).await
    }

    /// Every key, earliest-expiring first.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.range_by_score(0, u64::MAX).await
    }

    async fn records_between(&self, low: u64, high: u64) -> Result<Vec<IndexRecord>> {
        let members = self
            .store
            .index_range_by_score(&self.name, low as f64, high as f64)
            .await?;
        Ok(members
            .into_iter()
            .map(|(key, score)| IndexRecord {
                key,
                expires_at: score as u64,
            })
            .collect())
    }

    pub async fn remove_range_by_score(&self, low: u64, high: u64) -> Result<usize> {
        Ok(self
            .store
            .index_remove_range_by_score(&self.name, low as f64, high as f64)
            .await?)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.index_len(&self.name).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn index() -> ExpirationIndex {
        ExpirationIndex::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_record_per_key() {
        let index = index();

        index.upsert("a", 100).await.unwrap();
        index.upsert("a", 250).await.unwrap();

        assert_eq!(index.len().await.unwrap(), 1);
        assert_eq!(index.expires_at("a").await.unwrap(), Some(250));
    }

    #[tokio::test]
    async fn test_keys_are_ordered_by_expiry() {
        let index = index();
        index.upsert("late", 300).await.unwrap();
        index.upsert("early", 100).await.unwrap();
        index.upsert("middle", 200).await.unwrap();

        assert_eq!(index.keys().await.unwrap(), vec!["early", "middle", "late"]);
        assert_eq!(
            index.records().await.unwrap()[0],
            IndexRecord {
                key: "early".to_string(),
                expires_at: 100
            }
        );
        assert_eq!(index.range_by_score(150, 300).await.unwrap(), vec!["middle", "late"]);
    }

    #[tokio::test]
    async fn test_remove_and_remove_range() {
        let index = index();
        index.upsert("a", 1).await.unwrap();
        index.upsert("b", 2).await.unwrap();
        index.upsert("c", 3).await.unwrap();

        assert!(index.remove("b").await.unwrap());
        assert!(!index.remove("b").await.unwrap());
        assert_eq!(index.remove_range_by_score(0, 1).await.unwrap(), 1);
        assert_eq!(index.keys().await.unwrap(), vec!["c"]);
        assert!(!index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_separate_names_do_not_mix() {
        let store: Arc<dyn BackingStore> = Arc::new(MemoryBackend::new());
        let first = ExpirationIndex::named(store.clone(), "first");
        let second = ExpirationIndex::named(store, "second");

        first.upsert("k", 1).await.unwrap();
        assert!(second.is_empty().await.unwrap());
    }
}
