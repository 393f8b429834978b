//! Expiry Sweeper Task
//!
//! Background task that periodically removes expired entries from a store.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::EntryStore;

/// Spawns a background task that periodically removes expired entries.
///
/// The task wakes every `interval` and scans the whole store. It only ever
/// touches the store, never in-flight computations.
///
/// The task exits once `shutdown` carries `true` or its sender is dropped,
/// releasing its timer with it.
///
/// # Arguments
/// * `store` - Shared reference to the entry store
/// * `interval` - Time between sweeps, must be non-zero
/// * `shutdown` - Stop signal checked on every tick
///
/// # Example
/// ```ignore
/// let store = Arc::new(EntryStore::new());
/// let (stop, stop_rx) = watch::channel(false);
/// let handle = spawn_sweeper(store.clone(), Duration::from_secs(1), stop_rx);
/// // Later, during shutdown:
/// stop.send_replace(true);
/// handle.await?;
/// ```
pub fn spawn_sweeper<K, V>(
    store: Arc<EntryStore<K, V>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!("Starting expiry sweeper with interval of {:?}", interval);

        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Resolves on `true` and errors once the sender is gone; both mean stop.
                _ = shutdown.wait_for(|stopped| *stopped) => break,

                _ = ticker.tick() => {
                    let removed = store.cleanup_expired();

                    if removed > 0 {
                        info!("Expiry sweep: removed {} expired entries", removed);
                    } else {
                        debug!("Expiry sweep: no expired entries found");
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    })
}
