//! Cache Module
//!
//! Adaptive-TTL caching on top of a backing store: entry metadata, TTL
//! policy, the expiration index and the per-key adaptation lock.

mod engine;
mod entry;
mod index;
mod lock;
mod stats;
mod ttl;


// Re-export public types
pub use engine::CacheEngine;
pub use entry::{CacheEntry, EntryMetadata, Priority};
pub use index::{ExpirationIndex, IndexRecord, EXPIRATION_INDEX};
pub use lock::{KeyLock, LockToken, LOCK_SUFFIX};
pub use stats::{CacheStats, StatsSnapshot};
pub use ttl::TtlPolicy;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
