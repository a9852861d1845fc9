//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::store::StoreError;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Per-key adaptation lock not acquired within the retry budget
    #[error("Lock contention on key '{key}' after {attempts} attempts")]
    Contention { key: String, attempts: u32 },

    /// Backing store failed; never reported as a cache miss
    #[error(transparent)]
    BackingStoreUnavailable(#[from] StoreError),

    /// Entry payload or metadata could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Returns true for lock contention, which a caller may retry later.
    pub fn is_contention(&self) -> bool {
        matches!(self, CacheError::Contention { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_message() {
        let err = CacheError::Contention {
            key: "todo::1".to_string(),
            attempts: 3,
        };
        assert!(err.is_contention());
        assert_eq!(
            err.to_string(),
            "Lock contention on key 'todo::1' after 3 attempts"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: CacheError = StoreError::Unavailable("connection refused".to_string()).into();
        assert!(matches!(err, CacheError::BackingStoreUnavailable(_)));
        assert!(!err.is_contention());
        assert!(err.to_string().contains("connection refused"));
    }
}
