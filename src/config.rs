//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Cache engine and eviction scheduler parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity ceiling used to compute memory usage percentage
    pub max_memory_bytes: u64,
    /// Usage percentage at which an eviction cycle starts evicting
    pub eviction_threshold_pct: f64,
    /// Usage percentage an eviction cycle tries to get back under
    pub safe_threshold_pct: f64,
    /// Entries closer than this to expiry are evicted first
    pub eviction_grace_window_secs: u64,
    /// TTL unit for LOW priority; MEDIUM and HIGH get 2x and 3x
    pub initial_ttl_secs: u64,
    /// Ceiling for adapted TTLs
    pub max_ttl_secs: u64,
    /// Interval between eviction cycles
    pub scheduler_interval_secs: u64,
    /// Self-expiry of an adaptation lock record
    pub lock_ttl_secs: u64,
    /// Lock acquisition attempts before reporting contention
    pub max_lock_retries: u32,
    /// First backoff sleep; doubles after each failed attempt
    pub lock_backoff_base_ms: u64,
    /// Cap, in accesses per second, applied to both access frequencies
    pub max_access_frequency: f64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_MEMORY_BYTES` (default: 104857600)
    /// - `EVICTION_THRESHOLD_PCT` (default: 85)
    /// - `SAFE_THRESHOLD_PCT` (default: 60)
    /// - `EVICTION_GRACE_WINDOW_SECS` (default: 600)
    /// - `INITIAL_TTL_SECS` (default: 3600)
    /// - `MAX_TTL_SECS` (default: 10800)
    /// - `SCHEDULER_INTERVAL_SECS` (default: 600)
    /// - `LOCK_TTL_SECS` (default: 10)
    /// - `MAX_LOCK_RETRIES` (default: 3)
    /// - `LOCK_BACKOFF_BASE_MS` (default: 100)
    /// - `MAX_ACCESS_FREQUENCY` (default: 1.0)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_memory_bytes: env_or("MAX_MEMORY_BYTES", defaults.max_memory_bytes),
            eviction_threshold_pct: env_or(
                "EVICTION_THRESHOLD_PCT",
                defaults.eviction_threshold_pct,
            ),
            safe_threshold_pct: env_or("SAFE_THRESHOLD_PCT", defaults.safe_threshold_pct),
            eviction_grace_window_secs: env_or(
                "EVICTION_GRACE_WINDOW_SECS",
                defaults.eviction_grace_window_secs,
            ),
            initial_ttl_secs: env_or("INITIAL_TTL_SECS", defaults.initial_ttl_secs),
            max_ttl_secs: env_or("MAX_TTL_SECS", defaults.max_ttl_secs),
            scheduler_interval_secs: env_or(
                "SCHEDULER_INTERVAL_SECS",
                defaults.scheduler_interval_secs,
            ),
            lock_ttl_secs: env_or("LOCK_TTL_SECS", defaults.lock_ttl_secs),
            max_lock_retries: env_or("MAX_LOCK_RETRIES", defaults.max_lock_retries),
            lock_backoff_base_ms: env_or("LOCK_BACKOFF_BASE_MS", defaults.lock_backoff_base_ms),
            max_access_frequency: env_or("MAX_ACCESS_FREQUENCY", defaults.max_access_frequency),
        }
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_bytes == 0 {
            return Err(invalid("max_memory_bytes must be greater than zero"));
        }
        if !(self.safe_threshold_pct > 0.0
            && self.safe_threshold_pct < self.eviction_threshold_pct
            && self.eviction_threshold_pct <= 100.0)
        {
            return Err(invalid(
                "thresholds must satisfy 0 < safe_threshold_pct < eviction_threshold_pct <= 100",
            ));
        }
        if self.initial_ttl_secs == 0 {
            return Err(invalid("initial_ttl_secs must be greater than zero"));
        }
        if self.max_ttl_secs < self.initial_ttl_secs {
            return Err(invalid("max_ttl_secs must be at least initial_ttl_secs"));
        }
        if self.max_lock_retries == 0 {
            return Err(invalid("max_lock_retries must be at least 1"));
        }
        if self.lock_ttl_secs == 0 {
            return Err(invalid("lock_ttl_secs must be greater than zero"));
        }
        if self.scheduler_interval_secs == 0 {
            return Err(invalid("scheduler_interval_secs must be greater than zero"));
        }
        if !(self.max_access_frequency.is_finite() && self.max_access_frequency > 0.0) {
            return Err(invalid("max_access_frequency must be a positive number"));
        }
        Ok(())
    }

    pub fn initial_ttl(&self) -> Duration {
        Duration::from_secs(self.initial_ttl_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_backoff_base(&self) -> Duration {
        Duration::from_millis(self.lock_backoff_base_ms)
    }

    pub fn eviction_grace_window(&self) -> Duration {
        Duration::from_secs(self.eviction_grace_window_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_memory_bytes: 100 * 1024 * 1024,
            eviction_threshold_pct: 85.0,
            safe_threshold_pct: 60.0,
            eviction_grace_window_secs: 600,
            initial_ttl_secs: 3600,
            max_ttl_secs: 10800,
            scheduler_interval_secs: 600,
            lock_ttl_secs: 10,
            max_lock_retries: 3,
            lock_backoff_base_ms: 100,
            max_access_frequency: 1.0,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn invalid(msg: &str) -> CacheError {
    CacheError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_memory_bytes, 104_857_600);
        assert_eq!(config.eviction_threshold_pct, 85.0);
        assert_eq!(config.safe_threshold_pct, 60.0);
        assert_eq!(config.eviction_grace_window(), Duration::from_secs(600));
        assert_eq!(config.initial_ttl(), Duration::from_secs(3600));
        assert_eq!(config.max_ttl(), Duration::from_secs(10_800));
        assert_eq!(config.scheduler_interval(), Duration::from_secs(600));
        assert_eq!(config.lock_ttl(), Duration::from_secs(10));
        assert_eq!(config.max_lock_retries, 3);
        assert_eq!(config.lock_backoff_base(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("MAX_MEMORY_BYTES");
        env::remove_var("EVICTION_THRESHOLD_PCT");
        env::remove_var("INITIAL_TTL_SECS");
        env::remove_var("MAX_LOCK_RETRIES");

        let config = Config::from_env();
        assert_eq!(config.max_memory_bytes, 104_857_600);
        assert_eq!(config.eviction_threshold_pct, 85.0);
        assert_eq!(config.initial_ttl_secs, 3600);
        assert_eq!(config.max_lock_retries, 3);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let config = Config {
            safe_threshold_pct: 90.0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_memory_and_retries() {
        let zero_memory = Config {
            max_memory_bytes: 0,
            ..Config::default()
        };
        assert!(zero_memory.validate().is_err());

        let zero_retries = Config {
            max_lock_retries: 0,
            ..Config::default()
        };
        assert!(zero_retries.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_max_ttl_below_initial() {
        let config = Config {
            max_ttl_secs: 60,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_frequency_cap() {
        let config = Config {
            max_access_frequency: f64::INFINITY,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
