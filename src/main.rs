//! On-Demand Cache demo
//!
//! Fires many concurrent requests for one key at a cache backed by a slow
//! source and reports how often the source actually ran.

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ondemand_cache::{CacheConfig, OnDemandCache};

const DEMO_KEY: u64 = 10289;
const DEFAULT_CALLERS: usize = 5000;
const SOURCE_DELAY: Duration = Duration::from_millis(5);

/// Main entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load cache configuration from environment variables
/// 3. Build a cache over a slow counting source
/// 4. Release all callers at once against the same key
/// 5. Report results and shut the cache down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ondemand_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting on-demand cache demo");

    let config = CacheConfig::from_env();
    let callers = env::var("DEMO_CALLERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CALLERS)
        .max(1);
    info!(
        "Configuration loaded: ttl={:?}, sweep_interval={:?}, callers={}",
        config.ttl, config.sweep_interval, callers
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache = OnDemandCache::new(config, move |key: u64| {
        let counter = Arc::clone(&counter);
        async move {
            tokio::time::sleep(SOURCE_DELAY).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Some(key.to_string())
        }
    })?;

    let start = Arc::new(Barrier::new(callers));
    let mut tasks = JoinSet::new();
    for _ in 0..callers {
        let cache = cache.clone();
        let start = Arc::clone(&start);
        tasks.spawn(async move {
            start.wait().await;
            cache.get(DEMO_KEY).await
        });
    }

    let mut found = 0;
    while let Some(result) = tasks.join_next().await {
        if result?.is_some() {
            found += 1;
        }
    }

    info!(
        "{} of {} callers received a value, source invoked {} time(s)",
        found,
        callers,
        calls.load(Ordering::SeqCst)
    );

    cache.shutdown().await;
    info!("Demo complete");

    Ok(())
}
