//! Integration Tests for Single-Flight Population
//!
//! Exercises the cache from many concurrent tasks on a multi-threaded runtime.

use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ondemand_cache::{CacheConfig, OnDemandCache};
use tokio::sync::{Barrier, Notify};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};

// == Helper Functions ==

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Cache over a source that sleeps `delay`, counts calls and echoes the key.
fn slow_echo_cache(
    config: CacheConfig,
    delay: Duration,
) -> (OnDemandCache<u64, String>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache = OnDemandCache::new(config, move |key: u64| {
        let counter = Arc::clone(&counter);
        async move {
            sleep(delay).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Some(key.to_string())
        }
    })
    .unwrap();
    (cache, calls)
}

/// Spawns `n` tasks that all request `key` at the same moment.
fn spawn_concurrent_gets<V>(
    cache: &OnDemandCache<u64, V>,
    key: u64,
    n: usize,
) -> JoinSet<Option<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let start = Arc::new(Barrier::new(n));
    let mut tasks = JoinSet::new();
    for _ in 0..n {
        let cache = cache.clone();
        let start = Arc::clone(&start);
        tasks.spawn(async move {
            start.wait().await;
            cache.get(key).await
        });
    }
    tasks
}

async fn collect<V: 'static>(mut tasks: JoinSet<Option<V>>) -> Vec<Option<V>> {
    let mut results = Vec::new();
    while let Some(result) = tasks.join_next().await {
        results.push(result.unwrap());
    }
    results
}

// == Single-Flight ==

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_thundering_herd_computes_once_then_expires() {
    let config = CacheConfig::new(Duration::from_millis(50))
        .with_sweep_interval(Duration::from_millis(10));
    let (cache, calls) = slow_echo_cache(config, Duration::from_millis(5));
    const KEY: u64 = 10289;

    let tasks = spawn_concurrent_gets(&cache, KEY, 5000);
    let results = timeout(WAIT_LIMIT, collect(tasks)).await.unwrap();

    assert_eq!(results.len(), 5000);
    assert!(results.iter().all(|r| r.as_deref() == Some("10289")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Immediate follow-ups are served from the cache
    assert_eq!(cache.get(KEY).await.as_deref(), Some("10289"));
    assert_eq!(cache.get(KEY).await.as_deref(), Some("10289"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Past TTL plus a sweep interval the value is recomputed
    sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.get(KEY).await.as_deref(), Some("10289"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_miss_releases_all_followers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let cache: OnDemandCache<u64, String> = {
        let calls = Arc::clone(&calls);
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        OnDemandCache::new(CacheConfig::new(Duration::from_secs(60)), move |_key: u64| {
            let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            async move {
                if first {
                    started.notify_one();
                    release.notified().await;
                }
                None
            }
        })
        .unwrap()
    };

    let leader = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(1).await }
    });
    started.notified().await;
    assert_eq!(cache.in_flight(), 1);

    // Leader is parked in the source; every follower must queue on its barrier.
    let followers = spawn_concurrent_gets(&cache, 1, 100);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    release.notify_one();

    assert_eq!(leader.await.unwrap(), None);
    let results = timeout(WAIT_LIMIT, collect(followers))
        .await
        .expect("followers must not hang after a miss");

    assert_eq!(results.len(), 100);
    assert!(results.iter().all(Option::is_none));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.in_flight(), 0);
    assert!(cache.is_empty());

    // Misses are never cached
    assert_eq!(cache.get(1).await, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_compute_in_parallel() {
    // Both source calls must be in progress together to pass this barrier.
    let rendezvous = Arc::new(Barrier::new(2));
    let gate = Arc::clone(&rendezvous);
    let cache = OnDemandCache::new(CacheConfig::new(Duration::from_secs(60)), move |key: u64| {
        let gate = Arc::clone(&gate);
        async move {
            gate.wait().await;
            Some(key * 2)
        }
    })
    .unwrap();

    let (a, b) = timeout(WAIT_LIMIT, async { tokio::join!(cache.get(1), cache.get(2)) })
        .await
        .expect("different keys must not serialize on each other");

    assert_eq!(a, Some(2));
    assert_eq!(b, Some(4));

    cache.shutdown().await;
}

// == Leader Failure ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_leader_releases_followers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let cache: OnDemandCache<u64, String> = {
        let calls = Arc::clone(&calls);
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        OnDemandCache::new(CacheConfig::new(Duration::from_secs(60)), move |_key: u64| {
            let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            async move {
                if first {
                    started.notify_one();
                    release.notified().await;
                    panic!("source failure");
                }
                None
            }
        })
        .unwrap()
    };

    let leader = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(7).await }
    });
    started.notified().await;
    assert_eq!(cache.in_flight(), 1);

    let followers = spawn_concurrent_gets(&cache, 7, 100);
    sleep(Duration::from_millis(20)).await;
    release.notify_one();

    let leader_result = leader.await;
    assert!(leader_result.unwrap_err().is_panic());

    let results = timeout(WAIT_LIMIT, collect(followers))
        .await
        .expect("followers must not hang after the leader panics");
    assert!(results.iter().all(Option::is_none));
    assert_eq!(cache.in_flight(), 0);

    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_leader_releases_followers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Notify::new());

    let cache: OnDemandCache<u64, String> = {
        let calls = Arc::clone(&calls);
        let started = Arc::clone(&started);
        OnDemandCache::new(CacheConfig::new(Duration::from_secs(60)), move |_key: u64| {
            let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
            let started = Arc::clone(&started);
            async move {
                if first {
                    started.notify_one();
                    pending::<()>().await;
                }
                None
            }
        })
        .unwrap()
    };

    let leader = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(7).await }
    });
    started.notified().await;

    let followers = spawn_concurrent_gets(&cache, 7, 10);
    sleep(Duration::from_millis(20)).await;
    leader.abort();

    let results = timeout(WAIT_LIMIT, collect(followers))
        .await
        .expect("followers must not hang after the leader is cancelled");
    assert!(results.iter().all(Option::is_none));
    assert_eq!(cache.in_flight(), 0);

    cache.shutdown().await;
}

// == Expiry ==

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_immortal_entries_are_never_recomputed() {
    let config = CacheConfig::new(Duration::ZERO).with_sweep_interval(Duration::from_millis(10));
    let (cache, calls) = slow_echo_cache(config, Duration::from_millis(1));

    assert_eq!(cache.get(3).await.as_deref(), Some("3"));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.get(3).await.as_deref(), Some("3"));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweeper_evicts_unqueried_keys() {
    let config = CacheConfig::new(Duration::from_millis(20))
        .with_sweep_interval(Duration::from_millis(10));
    let (cache, _calls) = slow_echo_cache(config, Duration::ZERO);

    for key in 0..10 {
        cache.get(key).await;
    }
    assert_eq!(cache.len(), 10);

    sleep(Duration::from_millis(100)).await;

    assert!(cache.is_empty(), "Sweeper should evict expired entries");

    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_eviction_after_close_but_expiry_still_hidden() {
    let config = CacheConfig::new(Duration::from_millis(20))
        .with_sweep_interval(Duration::from_millis(10));
    let (cache, calls) = slow_echo_cache(config, Duration::ZERO);

    cache.get(1).await;
    cache.shutdown().await;
    assert!(cache.is_closed());

    sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.len(), 1, "No sweeping once closed");

    assert_eq!(cache.get(1).await.as_deref(), Some("1"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
