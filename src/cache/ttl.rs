//! TTL Policy Module
//!
//! Priority-based base TTLs and the access-frequency adaptation applied on
//! every re-cache of an existing key.

use std::time::Duration;

use crate::cache::{EntryMetadata, Priority};
use crate::config::Config;

const RECENT_FREQUENCY_WEIGHT: f64 = 0.5;
const OVERALL_FREQUENCY_WEIGHT: f64 = 0.5;

// == TTL Policy ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TtlPolicy {
    /// TTL unit; LOW gets one, MEDIUM two, HIGH three
    pub initial_ttl: Duration,
    /// Ceiling for adapted TTLs regardless of priority
    pub max_ttl: Duration,
    /// Cap on either access frequency, in accesses per second
    pub max_access_frequency: f64,
}

impl TtlPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_ttl: config.initial_ttl(),
            max_ttl: config.max_ttl(),
            max_access_frequency: config.max_access_frequency,
        }
    }

    // == Base TTL ==
    pub fn base_ttl(&self, priority: Priority) -> Duration {
        self.initial_ttl * priority.ttl_multiplier()
    }

    // == Access Frequency Ratio ==
    /// Blends long-run and recent access density for an entry at `now_ms`.
    ///
    /// Gaps are measured in whole seconds. A zero gap would make the matching
    /// frequency infinite; it is taken as `max_access_frequency` instead, and
    /// both frequencies are clamped to that cap, so the ratio always lies in
    /// `[0, max_access_frequency / 2]`.
    pub fn frequency_ratio(&self, metadata: &EntryMetadata, now_ms: u64) -> f64 {
        let elapsed_secs = now_ms.saturating_sub(metadata.initial_access_time) / 1000;
        let recent_gap_secs = now_ms.saturating_sub(metadata.last_access_time) / 1000;

        let recent_frequency = self.frequency(1, recent_gap_secs);
        let overall_frequency = self.frequency(metadata.usage_count + 1, elapsed_secs);

        (overall_frequency * OVERALL_FREQUENCY_WEIGHT + recent_frequency * RECENT_FREQUENCY_WEIGHT)
            / 2.0
    }

    fn frequency(&self, accesses: u64, over_secs: u64) -> f64 {
        if over_secs == 0 {
            return self.max_access_frequency;
        }
        (accesses as f64 / over_secs as f64).min(self.max_access_frequency)
    }

    // == Adapted TTL ==
    /// `min(base_ttl(priority) * (ratio + 1), max_ttl)`, truncated to whole seconds.
    pub fn adapted_ttl(&self, priority: Priority, ratio: f64) -> Duration {
        let ratio = if ratio.is_finite() { ratio.max(0.0) } else { 0.0 };
        let extended = (self.base_ttl(priority).as_secs() as f64 * (ratio + 1.0)) as u64;
        Duration::from_secs(extended.min(self.max_ttl.as_secs()))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn test_base_ttl_by_priority() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.base_ttl(Priority::Low), Duration::from_secs(3600));
        assert_eq!(policy.base_ttl(Priority::Medium), Duration::from_secs(7200));
        assert_eq!(policy.base_ttl(Priority::High), Duration::from_secs(10_800));
    }

    #[test]
    fn test_ratio_sixty_seconds_after_creation() {
        let policy = TtlPolicy::default();
        let metadata = EntryMetadata::new(Priority::Medium, T0);

        let ratio = policy.frequency_ratio(&metadata, T0 + 60_000);

        // (1/60 * 0.5 + 1/60 * 0.5) / 2
        assert!((ratio - 1.0 / 120.0).abs() < 1e-12);

        let ttl = policy.adapted_ttl(Priority::Medium, ratio).as_secs();
        assert!((7259..=7260).contains(&ttl), "unexpected ttl {}", ttl);
    }

    #[test]
    fn test_ratio_uses_usage_count_and_last_access() {
        let policy = TtlPolicy::default();
        let mut metadata = EntryMetadata::new(Priority::Low, T0);
        metadata.usage_count = 9;
        metadata.last_access_time = T0 + 90_000;

        // elapsed 100s, recent gap 10s
        let ratio = policy.frequency_ratio(&metadata, T0 + 100_000);
        let expected = (10.0 / 100.0 * 0.5 + 1.0 / 10.0 * 0.5) / 2.0;
        assert!((ratio - expected).abs() < 1e-12);
    }

    #[test]
    fn test_zero_gap_uses_frequency_cap() {
        let policy = TtlPolicy::default();
        let metadata = EntryMetadata::new(Priority::Low, T0);

        // Same wall-clock second as creation
        let ratio = policy.frequency_ratio(&metadata, T0 + 999);
        assert_eq!(ratio, policy.max_access_frequency / 2.0);
        assert!(ratio.is_finite());
    }

    #[test]
    fn test_frequencies_are_clamped() {
        let policy = TtlPolicy::default();
        let mut metadata = EntryMetadata::new(Priority::Low, T0);
        metadata.usage_count = 1_000;
        metadata.last_access_time = T0 + 1_000;

        let ratio = policy.frequency_ratio(&metadata, T0 + 2_000);
        assert_eq!(ratio, 0.5);
    }

    #[test]
    fn test_adapted_ttl_is_capped() {
        let policy = TtlPolicy::default();
        assert_eq!(
            policy.adapted_ttl(Priority::High, 0.5),
            Duration::from_secs(10_800)
        );
        assert_eq!(
            policy.adapted_ttl(Priority::Medium, 10.0),
            Duration::from_secs(10_800)
        );
    }

    #[test]
    fn test_adapted_ttl_ignores_nonsense_ratio() {
        let policy = TtlPolicy::default();
        assert_eq!(
            policy.adapted_ttl(Priority::Low, f64::NAN),
            Duration::from_secs(3600)
        );
        assert_eq!(
            policy.adapted_ttl(Priority::Low, -3.0),
            Duration::from_secs(3600)
        );
    }
}
