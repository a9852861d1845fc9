//! Clock Module
//!
//! Wall-clock source shared by the cache engine, the eviction scheduler and
//! the in-memory backend. Entry metadata is stamped in Unix milliseconds,
//! expiration scores in Unix seconds.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// == Clock Trait ==
/// Source of the current Unix time.
pub trait Clock: Send + Sync + Debug {
    /// Returns current Unix timestamp in milliseconds.
    fn now_ms(&self) -> u64;

    /// Returns current Unix timestamp in whole seconds.
    fn now_secs(&self) -> u64 {
        self.now_ms() / 1000
    }
}

/// Shared, type-erased clock handle.
pub type SharedClock = Arc<dyn Clock>;

// == System Clock ==
/// Reads UTC wall time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        // Pre-epoch system time clamps to zero
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

// == Manual Clock ==
/// A settable clock. Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute timestamp.
    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
        assert_eq!(SystemClock.now_secs(), SystemClock.now_ms() / 1000);
    }

    #[test]
    fn test_manual_clock_advance_is_shared() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();

        clock.advance(Duration::from_secs(2));

        assert_eq!(other.now_ms(), 3_000);
        assert_eq!(other.now_secs(), 3);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::new(0);
        clock.set_ms(42_999);
        assert_eq!(clock.now_secs(), 42);
    }
}
