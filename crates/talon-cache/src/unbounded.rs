//! An unbounded cache: a plain concurrent hash map plus the same
//! statistics counters `Cache` uses, with none of the eviction machinery.
//!
//! For callers who only want `dashmap::DashMap` with hit/miss counting and
//! never intend to bound memory. Not built on top of [`crate::cache::Cache`]
//! itself, since that would mean always paying for the read/write buffers,
//! the eviction lock, and the housekeeper thread for no benefit.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::DashMap;

use crate::stats::{CacheStats, Counters};

/// A concurrent, unbounded, in-process cache.
///
/// Entries are never evicted or expired; this is a thin convenience wrapper
/// over [`dashmap::DashMap`] for callers who know their key space is
/// naturally bounded and just want concurrent access plus optional
/// statistics.
pub struct UnboundedCache<K, V, S = RandomState> {
    map: DashMap<K, Arc<V>, S>,
    stats: Counters,
    record_stats: bool,
}

impl<K, V> UnboundedCache<K, V, RandomState>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache with the default hasher and no statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(RandomState::default())
    }
}

impl<K, V> Default for UnboundedCache<K, V, RandomState>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> UnboundedCache<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone,
{
    /// Creates an empty cache with a custom hasher.
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            map: DashMap::with_hasher(hasher),
            stats: Counters::default(),
            record_stats: false,
        }
    }

    /// Enables the statistics counters surfaced by [`Self::stats`].
    #[must_use]
    pub fn with_stats(mut self) -> Self {
        self.record_stats = true;
        self
    }

    /// Returns the value for `key`, recording a hit or a miss.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self.map.get(key).map(|r| Arc::clone(r.value()));
        if self.record_stats {
            if found.is_some() {
                self.stats.record_hit();
            } else {
                self.stats.record_miss();
            }
        }
        found
    }

    /// Unconditionally inserts `value`, returning the prior value if any.
    pub fn insert(&self, key: K, value: V) -> Option<Arc<V>> {
        self.map.insert(key, Arc::new(value))
    }

    /// Removes `key`, returning its value if present.
    pub fn invalidate(&self, key: &K) -> Option<Arc<V>> {
        self.map.remove(key).map(|(_, v)| v)
    }

    /// Removes every entry.
    pub fn invalidate_everything(&self) {
        self.map.clear();
    }

    /// Current number of entries.
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        self.map.len() as u64
    }

    /// An immutable snapshot of this cache's statistics. Zeroed unless
    /// [`Self::with_stats`] was called.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        if self.record_stats {
            self.stats.snapshot()
        } else {
            CacheStats::default()
        }
    }
}

impl<K, V, S> std::fmt::Debug for UnboundedCache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnboundedCache").finish_non_exhaustive()
    }
}
