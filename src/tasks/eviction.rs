//! Eviction Scheduler
//!
//! Background task that reclaims backing-store memory under pressure.
//!
//! Each cycle:
//! 1. Sweeps index records whose expiry already passed.
//! 2. Measures usage; below the eviction threshold the cycle ends.
//! 3. Light eviction: drops entries due to expire within the grace window.
//! 4. Re-measures; below the safe threshold the cycle ends.
//! 5. Deep eviction: drops the earliest-expiring 10% of keys, then 20%,
//!    30%... of what is left until usage is back under the safe threshold or
//!    the batch would exceed 100%.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::CacheEngine;
use crate::config::Config;
use crate::error::Result;

/// Batch growth per deep-eviction round, in percent of indexed keys.
pub const DEEP_EVICTION_STEP_PCT: usize = 10;

// == Eviction Outcome ==
/// Terminal state of one eviction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// Usage was below the eviction threshold
    NoAction,
    /// Light eviction brought usage under the safe threshold
    LightEvictionSufficient,
    /// Deep eviction brought usage down to the safe target
    DeepEvictionResolved,
    /// Deep eviction ran out of batches (or keys) above the safe target
    UnresolvedPressure,
}

// == Eviction Report ==
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionReport {
    pub outcome: EvictionOutcome,
    /// Stale index records removed by the sweep
    pub swept: usize,
    pub light_evicted: usize,
    pub deep_evicted: usize,
    /// Usage percentage measured before any eviction
    pub initial_usage_pct: f64,
    /// Usage percentage at the end of the cycle
    pub final_usage_pct: f64,
}

impl EvictionReport {
    pub fn evicted(&self) -> usize {
        self.light_evicted + self.deep_evicted
    }
}

// == Eviction Scheduler ==
#[derive(Clone)]
pub struct EvictionScheduler {
    engine: CacheEngine,
    max_memory_bytes: u64,
    eviction_threshold_pct: f64,
    safe_threshold_pct: f64,
    grace_window: Duration,
}

impl EvictionScheduler {
    pub fn new(engine: CacheEngine, config: &Config) -> Self {
        Self {
            engine,
            max_memory_bytes: config.max_memory_bytes,
            eviction_threshold_pct: config.eviction_threshold_pct,
            safe_threshold_pct: config.safe_threshold_pct,
            grace_window: config.eviction_grace_window(),
        }
    }

    /// Current usage as a percentage of `max_memory_bytes`.
    pub async fn usage_pct(&self) -> Result<f64> {
        let used = self.engine.store().used_memory_bytes().await?;
        Ok(used as f64 / self.max_memory_bytes as f64 * 100.0)
    }

    /// Byte level deep eviction aims for.
    pub fn target_bytes(&self) -> u64 {
        (self.safe_threshold_pct / 100.0 * self.max_memory_bytes as f64) as u64
    }

    // == Run Cycle ==
    /// Runs one full cycle to a terminal outcome.
    pub async fn run_cycle(&self) -> Result<EvictionReport> {
        let now_secs = self.engine.clock().now_secs();
        let swept = self.engine.index().remove_range_by_score(0, now_secs).await?;
        if swept > 0 {
            debug!(swept, "removed stale expiration records");
        }

        let initial_usage_pct = self.usage_pct().await?;
        let mut report = EvictionReport {
            outcome: EvictionOutcome::NoAction,
            swept,
            light_evicted: 0,
            deep_evicted: 0,
            initial_usage_pct,
            final_usage_pct: initial_usage_pct,
        };
        if initial_usage_pct < self.eviction_threshold_pct {
            return Ok(report);
        }

        report.light_evicted = self.light_evict(now_secs).await?;
        report.final_usage_pct = self.usage_pct().await?;
        if report.final_usage_pct < self.safe_threshold_pct {
            report.outcome = EvictionOutcome::LightEvictionSufficient;
            return Ok(report);
        }

        let (deep_evicted, resolved) = self.deep_evict().await?;
        report.deep_evicted = deep_evicted;
        report.final_usage_pct = self.usage_pct().await?;
        report.outcome = if resolved {
            EvictionOutcome::DeepEvictionResolved
        } else {
            EvictionOutcome::UnresolvedPressure
        };
        Ok(report)
    }

    // == Light Evict ==
    /// Evicts every entry whose remaining TTL is under the grace window.
    async fn light_evict(&self, now_secs: u64) -> Result<usize> {
        let grace_secs = self.grace_window.as_secs();
        let records = self.engine.index().records().await?;

        let mut evicted = 0;
        for record in records
            .iter()
            .filter(|r| r.expires_at.saturating_sub(now_secs) < grace_secs)
        {
            if self.engine.evict(&record.key).await? {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    // == Deep Evict ==
    /// Evicts earliest-expiring keys in growing batches.
    ///
    /// Returns the number of keys evicted and whether usage reached the target.
    async fn deep_evict(&self) -> Result<(usize, bool)> {
        let target = self.target_bytes();
        let mut batch_pct = DEEP_EVICTION_STEP_PCT;
        let mut evicted = 0;

        loop {
            // Fresh snapshot each round; the key set shrinks under us
            let keys = self.engine.index().keys().await?;
            if keys.is_empty() {
                return Ok((evicted, false));
            }

            let batch = (keys.len() * batch_pct).div_ceil(100);
            for key in keys.iter().take(batch) {
                if self.engine.evict(key).await? {
                    evicted += 1;
                }
            }

            let used = self.engine.store().used_memory_bytes().await?;
            debug!(batch_pct, batch, used, target, "deep eviction round");
            if used <= target {
                return Ok((evicted, true));
            }

            batch_pct += DEEP_EVICTION_STEP_PCT;
            if batch_pct > 100 {
                return Ok((evicted, false));
            }
        }
    }
}

/// Spawns a background task that runs an eviction cycle every `interval`.
///
/// The task sleeps first, then runs a cycle, forever. Failed cycles are
/// logged and the next tick tries again.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let scheduler = EvictionScheduler::new(engine, &config);
/// let handle = spawn_eviction_task(scheduler, config.scheduler_interval());
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_eviction_task(scheduler: EvictionScheduler, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting eviction task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match scheduler.run_cycle().await {
                Ok(report) => log_report(&report),
                Err(e) => error!(error = %e, "eviction cycle failed"),
            }
        }
    })
}

fn log_report(report: &EvictionReport) {
    match report.outcome {
        EvictionOutcome::NoAction => debug!(
            usage_pct = report.initial_usage_pct,
            swept = report.swept,
            "eviction cycle: no action"
        ),
        EvictionOutcome::UnresolvedPressure => warn!(
            initial_usage_pct = report.initial_usage_pct,
            final_usage_pct = report.final_usage_pct,
            evicted = report.evicted(),
            "eviction cycle ended with unresolved memory pressure"
        ),
        outcome => info!(
            ?outcome,
            initial_usage_pct = report.initial_usage_pct,
            final_usage_pct = report.final_usage_pct,
            light_evicted = report.light_evicted,
            deep_evicted = report.deep_evicted,
            "eviction cycle reclaimed memory"
        ),
    }
}
