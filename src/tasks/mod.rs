//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside caller traffic.
//!
//! # Tasks
//! - Eviction: reclaims backing-store memory when usage crosses a threshold

mod eviction;

pub use eviction::{
    spawn_eviction_task, EvictionOutcome, EvictionReport, EvictionScheduler,
    DEEP_EVICTION_STEP_PCT,
};
