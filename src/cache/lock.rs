//! Key Lock Module
//!
//! Per-key mutual exclusion held in the backing store as a self-expiring
//! `<key>:lock` record, so it works across every process sharing the store.
//! Each acquisition writes its own token into the record and release only
//! deletes a record that still carries that token.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::store::BackingStore;

/// Suffix appended to a cache key to form its lock record key.
pub const LOCK_SUFFIX: &str = ":lock";

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

// == Lock Token ==
/// Proof of one successful acquisition, stored as the lock record's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        let seq = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{}", std::process::id(), seq))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

// == Key Lock ==
#[derive(Clone)]
pub struct KeyLock {
    store: Arc<dyn BackingStore>,
    /// Self-expiry of a lock record, bounding how long a crashed holder blocks others
    ttl: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl KeyLock {
    pub fn new(
        store: Arc<dyn BackingStore>,
        ttl: Duration,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            store,
            ttl,
            max_attempts,
            backoff_base,
        }
    }

    pub fn from_config(store: Arc<dyn BackingStore>, config: &Config) -> Self {
        Self::new(
            store,
            config.lock_ttl(),
            config.max_lock_retries,
            config.lock_backoff_base(),
        )
    }

    pub fn lock_key(key: &str) -> String {
        format!("{}{}", key, LOCK_SUFFIX)
    }

    /// Sleep after failed attempt `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    // == Acquire ==
    /// Tries up to `max_attempts` times, backing off between attempts.
    ///
    /// # Returns
    /// The token to hand back to [`KeyLock::release`].
    ///
    /// Fails with `CacheError::Contention` once the attempts are spent.
    /// Store errors abort immediately.
    pub async fn acquire(&self, key: &str) -> Result<LockToken> {
        let lock_key = Self::lock_key(key);
        let token = LockToken::generate();
        for attempt in 0..self.max_attempts {
            if self
                .store
                .set_if_absent(&lock_key, token.as_bytes().to_vec(), self.ttl)
                .await?
            {
                return Ok(token);
            }
            if attempt + 1 < self.max_attempts {
                let wait = self.backoff(attempt);
                debug!(key, attempt, wait_ms = wait.as_millis() as u64, "lock busy, backing off");
                sleep(wait).await;
            }
        }
        warn!(key, attempts = self.max_attempts, "gave up acquiring adaptation lock");
        Err(CacheError::Contention {
            key: key.to_string(),
            attempts: self.max_attempts,
        })
    }

    // == Release ==
    /// Deletes the lock record if it still carries `token`.
    ///
    /// Returns false when the record already expired or now belongs to
    /// another holder; that record is left untouched.
    pub async fn release(&self, key: &str, token: &LockToken) -> Result<bool> {
        let released = self
            .store
            .delete_if_equals(&Self::lock_key(key), token.as_bytes())
            .await?;
        if !released {
            warn!(key, "adaptation lock expired before release");
        }
        Ok(released)
    }

    // == With Lock ==
    /// Runs `f` while holding the lock for `key`.
    ///
    /// The lock is released on every exit path once acquired. An error from
    /// `f` takes precedence over a failure to release.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.acquire(key).await?;
        let outcome = f().await;
        let released = self.release(key, &token).await;

        match (outcome, released) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(key, error = %release_err, "failed to release adaptation lock");
                Err(e)
            }
        }
    }
}
