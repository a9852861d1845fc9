//! Adaptive TTL Cache - a caching layer in front of a key-value store
//!
//! Entries get a TTL from their priority that grows with how often they are
//! re-cached, and a background scheduler reclaims memory under pressure.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod repository;
pub mod store;
pub mod tasks;

pub use cache::{CacheEngine, Priority};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_eviction_task, EvictionScheduler};
