//! The concurrent hash index: key -> entry handle.
//!
//! Built directly on [`dashmap::DashMap`], the same lock-free concurrent
//! hashmap this codebase already reaches for whenever a hot path needs
//! shared, sharded, mutable state (see the two-tier `LockFreeLruCache`).
//! The index treats entries opaquely: every policy decision (recency,
//! weight, expiry) lives in [`crate::policy`], never here.

use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use crate::entry::Entry;

pub(crate) struct HashIndex<K, V, S> {
    map: DashMap<K, Arc<Entry<K, V>>, S>,
}

impl<K, V, S> HashIndex<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone,
{
    pub(crate) fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            map: DashMap::with_capacity_and_hasher(capacity, hasher),
        }
    }

    /// Wait-free with respect to other readers; never blocks a concurrent
    /// writer beyond the shard it falls in.
    pub(crate) fn lookup(&self, key: &K) -> Option<Arc<Entry<K, V>>> {
        self.map.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Atomic: installs `record` only if `key` is currently absent.
    /// Returns the entry that is now mapped to `key` (either the one just
    /// inserted, or whatever was already there).
    pub(crate) fn insert_if_absent(
        &self,
        key: K,
        record: Arc<Entry<K, V>>,
    ) -> (Arc<Entry<K, V>>, bool) {
        match self.map.entry(key) {
            DashEntry::Occupied(o) => (Arc::clone(o.get()), false),
            DashEntry::Vacant(v) => {
                let inserted = Arc::clone(&record);
                v.insert(record);
                (inserted, true)
            }
        }
    }

    /// Unconditional insert/replace. Returns the prior record, if any.
    pub(crate) fn upsert(&self, key: K, record: Arc<Entry<K, V>>) -> Option<Arc<Entry<K, V>>> {
        self.map.insert(key, record)
    }

    /// Atomic compare-and-set: replaces the mapping for `key` with `new`
    /// only if it currently points at `old` (by `Arc` identity).
    pub(crate) fn replace(&self, key: &K, old: &Arc<Entry<K, V>>, new: Arc<Entry<K, V>>) -> bool {
        match self.map.entry(key.clone()) {
            DashEntry::Occupied(mut o) => {
                if Arc::ptr_eq(o.get(), old) {
                    o.insert(new);
                    true
                } else {
                    false
                }
            }
            DashEntry::Vacant(_) => false,
        }
    }

    /// Atomic compare-and-remove: succeeds only if `key` still maps to
    /// `record`.
    pub(crate) fn remove(&self, key: &K, record: &Arc<Entry<K, V>>) -> bool {
        self.map
            .remove_if(key, |_, v| Arc::ptr_eq(v, record))
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&self) {
        self.map.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (K, Arc<Entry<K, V>>)> + '_ {
        self.map.iter().map(|r| (r.key().clone(), Arc::clone(r.value())))
    }
}
