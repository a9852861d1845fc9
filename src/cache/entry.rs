//! Cache Entry Module
//!
//! Defines the stored shape of a cache entry: the caller's payload plus the
//! access metadata that drives TTL adaptation.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Priority ==
/// Caller-declared importance tier controlling the base TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// Number of TTL units an entry of this priority starts with.
    pub fn ttl_multiplier(self) -> u32 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown priority '{}'",
                other
            ))),
        }
    }
}

// == Entry Metadata ==
/// Access metadata stored alongside every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Creation timestamp (Unix milliseconds), never changes
    pub initial_access_time: u64,
    /// Timestamp of the latest adaptation (Unix milliseconds)
    pub last_access_time: u64,
    /// Number of adaptations so far
    pub usage_count: u64,
    /// Fixed at creation
    pub priority: Priority,
}

impl EntryMetadata {
    pub fn new(priority: Priority, now_ms: u64) -> Self {
        Self {
            initial_access_time: now_ms,
            last_access_time: now_ms,
            usage_count: 0,
            priority,
        }
    }

    /// Records one adaptation at `now_ms`.
    pub fn record_access(&mut self, now_ms: u64) {
        self.last_access_time = now_ms;
        self.usage_count += 1;
    }
}

// == Cache Entry ==
/// A cached payload with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub data: V,
    pub metadata: EntryMetadata,
}

impl<V> CacheEntry<V> {
    /// Creates a fresh entry stamped at `now_ms`.
    pub fn new(data: V, priority: Priority, now_ms: u64) -> Self {
        Self {
            data,
            metadata: EntryMetadata::new(priority, now_ms),
        }
    }
}

impl<V: Serialize> CacheEntry<V> {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<V: DeserializeOwned> CacheEntry<V> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
