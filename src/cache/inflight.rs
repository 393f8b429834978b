//! In-Flight Table Module
//!
//! Tracks which keys currently have a computation running and lets late callers
//! wait for it instead of starting their own.

use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

// == In-Flight Table ==
/// Concurrent `K -> barrier` map used for leader election.
///
/// Each barrier is the sending half of a `watch` channel that never carries a
/// value. Removing the key drops the sender, which closes the channel and wakes
/// every subscribed follower at once.
#[derive(Debug)]
pub struct InflightTable<K>
where
    K: Eq + Hash,
{
    barriers: DashMap<K, watch::Sender<()>>,
}

/// Outcome of [`InflightTable::try_insert`].
#[derive(Debug)]
pub enum Flight<'a, K>
where
    K: Eq + Hash,
{
    /// The caller registered the barrier and must compute the value.
    Leader(LeaderGuard<'a, K>),
    /// Another caller is already computing; wait on the barrier.
    Follower(Barrier),
}

impl<K> Default for InflightTable<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            barriers: DashMap::new(),
        }
    }
}

impl<K> InflightTable<K>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    // == Try Insert ==
    /// Atomically registers a fresh barrier for `key` if none exists.
    ///
    /// Exactly one of any number of concurrent callers observes the key as
    /// absent and becomes the leader. Followers subscribe while the shard is
    /// locked, so they cannot miss the leader's release.
    pub fn try_insert(&self, key: K) -> Flight<'_, K> {
        match self.barriers.entry(key) {
            Entry::Occupied(occupied) => Flight::Follower(Barrier {
                signal: occupied.get().subscribe(),
            }),
            Entry::Vacant(vacant) => {
                let key = vacant.key().clone();
                let (sender, _) = watch::channel(());
                vacant.insert(sender);
                Flight::Leader(LeaderGuard { table: self, key })
            }
        }
    }

    /// Returns the number of keys with a computation in progress.
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    /// Returns true if no computation is in progress.
    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }
}

// == Leader Guard ==
/// Proof of leadership for one key.
///
/// Dropping the guard removes the key from the table and releases all
/// followers. This happens on every exit path of the leader, including panics
/// and cancellation of the leader's future.
#[derive(Debug)]
pub struct LeaderGuard<'a, K>
where
    K: Eq + Hash,
{
    table: &'a InflightTable<K>,
    key: K,
}

impl<K> Drop for LeaderGuard<'_, K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.table.barriers.remove(&self.key);
    }
}

// == Barrier ==
/// One-shot signal a follower waits on.
#[derive(Debug)]
pub struct Barrier {
    signal: watch::Receiver<()>,
}

impl Barrier {
    /// Waits until the leader for this key has released its guard.
    ///
    /// Returns immediately if the release already happened.
    pub async fn wait(mut self) {
        // No value is ever sent; `changed` only fails once the sender is gone.
        while self.signal.changed().await.is_ok() {}
    }
}
