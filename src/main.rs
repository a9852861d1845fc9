//! Adaptive TTL Cache daemon
//!
//! Runs the cache engine over the in-memory backend with the eviction
//! scheduler on its timer until shutdown.

use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaptive_ttl_cache::store::{BackingStore, MemoryBackend};
use adaptive_ttl_cache::{spawn_eviction_task, CacheEngine, Config, EvictionScheduler};

/// Main entry point for the cache daemon.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Create the backing store and cache engine
/// 4. Start the background eviction task
/// 5. Wait for SIGINT/SIGTERM, then stop the task
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_ttl_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Adaptive TTL Cache");

    let config = Config::from_env();
    config.validate()?;
    info!(
        "Configuration loaded: max_memory_bytes={}, initial_ttl={}s, max_ttl={}s, scheduler_interval={}s",
        config.max_memory_bytes,
        config.initial_ttl_secs,
        config.max_ttl_secs,
        config.scheduler_interval_secs
    );

    let store: Arc<dyn BackingStore> = Arc::new(MemoryBackend::new());
    let engine = CacheEngine::new(store, &config);
    info!("Cache engine initialized");

    let scheduler = EvictionScheduler::new(engine, &config);
    let eviction_handle = spawn_eviction_task(scheduler, config.scheduler_interval());
    info!("Background eviction task started");

    shutdown_signal().await?;

    eviction_handle.abort();
    warn!("Eviction task aborted");
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
