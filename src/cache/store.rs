//! Entry Store Module
//!
//! Sharded concurrent storage for computed entries with TTL expiration.

use std::hash::Hash;
use std::time::Instant;

use dashmap::DashMap;

use crate::cache::CacheEntry;

// == Entry Store ==
/// Concurrent `K -> CacheEntry<V>` map.
///
/// All operations take `&self`; locking is internal and per shard, so callers
/// working on different keys never serialize on a global lock.
#[derive(Debug)]
pub struct EntryStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K, V> Default for EntryStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> EntryStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Returns a clone of the value for `key` if it is present and live at `now`.
    ///
    /// An expired entry is treated as absent and removed, unless it was replaced
    /// by a fresh one in the meantime.
    pub fn get_live_at(&self, key: &K, now: Instant) -> Option<V> {
        {
            let guard = self.entries.get(key)?;
            let entry: &CacheEntry<V> = &guard;
            if !entry.is_expired_at(now) {
                return Some(entry.value().clone());
            }
        }

        // The read guard must be released before taking the shard write lock.
        self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        None
    }

    /// Returns a clone of the value for `key` if it is present and live right now.
    pub fn get_live(&self, key: &K) -> Option<V> {
        self.get_live_at(key, Instant::now())
    }

    // == Insert ==
    /// Stores `entry` under `key`, overwriting any previous entry.
    pub fn insert(&self, key: K, entry: CacheEntry<V>) {
        self.entries.insert(key, entry);
    }

    // == Remove ==
    /// Removes the entry for `key`. Returns `true` if one was present.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Cleanup Expired ==
    /// Removes every entry that is expired at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Removes every entry that is expired right now.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    // == Length ==
    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
