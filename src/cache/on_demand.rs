//! On-Demand Cache Module
//!
//! Memoizing cache that populates itself from a source function on a miss,
//! running at most one source call per key at any time.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEntry, EntryStore, Flight, InflightTable};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweeper;

type SourceFuture<V> = Pin<Box<dyn Future<Output = Option<V>> + Send>>;
type SourceFn<K, V> = dyn Fn(K) -> SourceFuture<V> + Send + Sync;

// == On-Demand Cache ==
/// Concurrency-safe memoizing cache backed by a source function.
///
/// On a miss, exactly one caller per key (the leader) invokes the source while
/// every other caller for that key waits and then reads what the leader
/// published. A source that reports no value (`None`) is never cached.
///
/// The cache provides no timeout: if the source never returns, every caller
/// waiting on that key waits forever. Bound the source itself if needed.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct OnDemandCache<K, V>
where
    K: Eq + Hash,
{
    inner: Arc<Inner<K, V>>,
}

struct Inner<K, V>
where
    K: Eq + Hash,
{
    config: CacheConfig,
    store: Arc<EntryStore<K, V>>,
    inflight: InflightTable<K>,
    source: Box<SourceFn<K, V>>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> Clone for OnDemandCache<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for OnDemandCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandCache")
            .field("config", &self.inner.config)
            .field("closed", &*self.inner.shutdown.borrow())
            .finish_non_exhaustive()
    }
}

impl<K, V> OnDemandCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache over an async source and starts the sweeper if configured.
    ///
    /// # Errors
    /// - `CacheError::InvalidConfig` if the configuration does not validate
    /// - `CacheError::NoRuntime` if a sweeper is configured but no tokio runtime is running
    pub fn new<F, Fut>(config: CacheConfig, source: F) -> Result<Self>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<V>> + Send + 'static,
    {
        Self::build(
            config,
            Box::new(move |key: K| -> SourceFuture<V> { Box::pin(source(key)) }),
        )
    }

    /// Creates a cache over a blocking source.
    ///
    /// Each source call runs on tokio's blocking thread pool. A call that panics
    /// is logged and treated as a miss.
    pub fn from_blocking<F>(config: CacheConfig, source: F) -> Result<Self>
    where
        F: Fn(K) -> Option<V> + Send + Sync + 'static,
    {
        let source = Arc::new(source);
        Self::new(config, move |key: K| {
            let source = Arc::clone(&source);
            async move {
                match tokio::task::spawn_blocking(move || source(key)).await {
                    Ok(found) => found,
                    Err(err) => {
                        error!("Blocking source failed: {}", err);
                        None
                    }
                }
            }
        })
    }

    fn build(config: CacheConfig, source: Box<SourceFn<K, V>>) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(EntryStore::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let sweeper = match config.sweep_interval {
            Some(interval) => {
                if Handle::try_current().is_err() {
                    return Err(CacheError::NoRuntime);
                }
                Some(spawn_sweeper(Arc::clone(&store), interval, shutdown_rx))
            }
            None => None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                inflight: InflightTable::new(),
                source,
                shutdown,
                sweeper: Mutex::new(sweeper),
            }),
        })
    }

    // == Get ==
    /// Returns the value for `key`, computing it through the source on a miss.
    ///
    /// Returns `None` only when the source reported no value. Concurrent callers
    /// for the same key share a single source call.
    pub async fn get(&self, key: K) -> Option<V> {
        if let Some(value) = self.inner.store.get_live(&key) {
            return Some(value);
        }

        self.load(key).await
    }

    /// Slow path of `get`: elects a leader for `key` or waits for the current one.
    async fn load(&self, key: K) -> Option<V> {
        let inner = &*self.inner;

        match inner.inflight.try_insert(key.clone()) {
            Flight::Leader(guard) => {
                // A previous leader may have published between the fast path and election.
                if let Some(value) = inner.store.get_live(&key) {
                    return Some(value);
                }

                debug!("Elected leader, invoking source");
                let found = (inner.source)(key.clone()).await;

                match &found {
                    Some(value) => inner
                        .store
                        .insert(key, CacheEntry::new(value.clone(), inner.config.ttl)),
                    None => debug!("Source reported no value, nothing cached"),
                }

                // Publishing must happen before followers are released.
                drop(guard);
                found
            }
            Flight::Follower(barrier) => {
                barrier.wait().await;
                debug!("Released by leader, re-reading store");
                inner.store.get_live(&key)
            }
        }
    }

    // == Invalidate ==
    /// Drops the cached value for `key`. Returns `true` if one was present.
    ///
    /// A computation already in flight for `key` still publishes its result.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.store.remove(key)
    }

    // == Purge Expired ==
    /// Removes every expired entry now, independently of the sweeper.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.store.cleanup_expired()
    }

    // == Close ==
    /// Stops background eviction.
    ///
    /// Idempotent. Cached values stay readable and `get` keeps computing misses;
    /// expired entries are still hidden by the read-time check.
    pub fn close(&self) {
        if !self.inner.shutdown.send_replace(true) {
            info!("Cache closed, background eviction stopped");
        }
    }

    /// Closes the cache and waits for the sweeper task to exit.
    pub async fn shutdown(&self) {
        self.close();

        let handle = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("Expiry sweeper ended abnormally: {}", err);
            }
        }
    }

    // == Accessors ==
    /// Returns true once `close` or `shutdown` has been called.
    pub fn is_closed(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Returns the configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Returns the number of keys with a source call in progress.
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.len()
    }
}
