//! The public, synchronous cache facade.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::builder::{CacheBuilder, Config};
use crate::buffer::WriteTask;
use crate::entry::{Entry, LoadOutcome, Status};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::index::HashIndex;
use crate::loader::Loader;
use crate::maintenance::{Housekeeper, Maintenance};
use crate::notification::RemovalCause;
use crate::policy::{Policy, PolicyConfig};
use crate::stats::CacheStats;
use crate::ticker::Ticker;

type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u64 + Send + Sync>;

struct Inner<K, V, S> {
    index: HashIndex<K, V, S>,
    maintenance: Maintenance<K, V>,
    ticker: Arc<dyn Ticker>,
    executor: Arc<dyn Executor>,
    loader: Option<Arc<dyn Loader<K, V>>>,
    weigher: Option<Weigher<K, V>>,
    refresh_after_write_nanos: Option<u64>,
    record_stats: bool,
    key_reclaim_probe: Option<fn(&K) -> bool>,
    value_reclaim_probe: Option<fn(&V) -> bool>,
}

/// A concurrent, bounded, in-process cache.
///
/// Cheap to clone: a `Cache` is a thin handle around an `Arc`-shared inner
/// state, so the idiomatic way to share one cache across threads is to
/// `clone()` it into each, the same way `Arc<T>` itself is shared.
pub struct Cache<K, V, S = RandomState> {
    inner: Arc<Inner<K, V, S>>,
    // Keeps the background drain thread alive for exactly as long as at
    // least one `Cache` handle does, without the thread's own `Weak`
    // upgrade path ever needing to be `Arc` (see `Inner`'s absence of a
    // back-reference): the housekeeper closure closes only over a `Weak<Inner>`.
    housekeeper: Arc<Housekeeper>,
}

impl<K, V, S> Clone for Cache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            housekeeper: Arc::clone(&self.housekeeper),
        }
    }
}

impl<K, V> Cache<K, V, RandomState>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Starts building a cache with the default hasher.
    #[must_use]
    pub fn builder() -> CacheBuilder<K, V, RandomState> {
        CacheBuilder::new()
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn from_config(config: Config<K, V, S>) -> Self {
        let index = HashIndex::with_capacity_and_hasher(config.initial_capacity, config.hasher);
        let policy = Policy::new(PolicyConfig {
            max_weight: config.max_weight,
            expire_after_access_nanos: config.expire_after_access_nanos,
            expire_after_write_nanos: config.expire_after_write_nanos,
            track_reclamation: config.track_reclamation,
        });
        let maintenance = Maintenance::new(policy, config.removal_listener, Arc::clone(&config.executor));

        let inner = Arc::new(Inner {
            index,
            maintenance,
            ticker: config.ticker,
            executor: config.executor,
            loader: config.loader,
            weigher: config.weigher,
            refresh_after_write_nanos: config.refresh_after_write_nanos,
            record_stats: config.record_stats,
            key_reclaim_probe: config.key_reclaim_probe,
            value_reclaim_probe: config.value_reclaim_probe,
        });

        let weak = Arc::downgrade(&inner);
        let housekeeper = Housekeeper::spawn(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .maintenance
                    .force_drain(&inner.index, inner.ticker.as_ref());
            }
        });

        Self {
            inner,
            housekeeper: Arc::new(housekeeper),
        }
    }

    fn now(&self) -> u64 {
        self.inner.ticker.now_nanos()
    }

    fn weight_of(&self, key: &K, value: &V) -> u64 {
        match &self.inner.weigher {
            Some(weigher) => weigher(key, value),
            None => 1,
        }
    }

    fn schedule(&self) {
        self.inner
            .maintenance
            .schedule(&self.inner.index, self.inner.ticker.as_ref());
    }

    fn record_read(&self, entry: &Arc<Entry<K, V>>) {
        self.inner.maintenance.record_read(Arc::clone(entry));
        self.schedule();
    }

    fn is_live(&self, entry: &Entry<K, V>) -> bool {
        entry.status() == Status::Alive && !entry.is_reclaimed()
    }

    /// Returns the value for `key` if present and unexpired, recording a
    /// hit or a miss. If `refresh_after_write` is configured and the
    /// loader-backed cache is in scope, a stale-but-present value triggers
    /// a background refresh and is still returned immediately.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let entry = self.inner.index.lookup(key)?;
        if entry.status() != Status::Alive {
            self.inner.maintenance.stats().record_miss();
            return None;
        }
        if entry.is_reclaimed() {
            self.invalidate_entry(key, &entry, RemovalCause::Collected);
            self.inner.maintenance.stats().record_miss();
            return None;
        }
        entry.touch_access(self.now());
        self.record_read(&entry);
        self.maybe_refresh(key, &entry);
        self.inner.maintenance.stats().record_hit();
        entry.value()
    }

    fn maybe_refresh(&self, key: &K, entry: &Arc<Entry<K, V>>) {
        let Some(threshold) = self.inner.refresh_after_write_nanos else {
            return;
        };
        let Some(loader) = self.inner.loader.clone() else {
            return;
        };
        if self.now().saturating_sub(entry.write_time()) < threshold {
            return;
        }
        if !entry.try_start_refresh() {
            return; // another thread's refresh is already in flight
        }

        self.inner
            .maintenance
            .submit_write(WriteTask::RefreshStart(Arc::clone(entry)));

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        let entry = Arc::clone(entry);
        inner.executor.execute(Box::new(move || {
            let outcome = match entry.value() {
                Some(old_value) => loader.reload(&key, &old_value),
                None => return,
            };
            match outcome {
                Ok(Some(new_value)) => {
                    let now = inner.ticker.now_nanos();
                    let weight = match &inner.weigher {
                        Some(weigher) => weigher(&key, &new_value),
                        None => 1,
                    };
                    entry.set_value(Arc::new(new_value));
                    entry.record_write(now, weight);
                    inner.maintenance.stats().record_load_success(0);
                    inner.maintenance.submit_write(WriteTask::Update(Arc::clone(&entry)));
                }
                Ok(None) => {
                    if entry.compare_exchange_status(Status::Alive, Status::Retired) {
                        inner.index.remove(&key, &entry);
                        inner
                            .maintenance
                            .submit_write(WriteTask::Remove(Arc::clone(&entry), RemovalCause::Explicit));
                    }
                }
                Err(error) => {
                    inner.maintenance.stats().record_load_failure(0);
                    tracing::warn!(?error, "talon-cache: refresh failed, keeping prior value");
                }
            }
            entry.end_refresh();
            inner
                .maintenance
                .submit_write(WriteTask::RefreshEnd(Arc::clone(&entry)));
            inner.maintenance.schedule(&inner.index, inner.ticker.as_ref());
        }));
    }

    /// Single-flight compute-if-absent: `loader` runs at most once per
    /// concurrent cohort of callers racing on the same missing key.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if it fails; no mapping is installed in
    /// that case.
    pub fn get_with<L: Loader<K, V>>(&self, key: &K, loader: &L) -> Result<Arc<V>> {
        loop {
            if let Some(entry) = self.inner.index.lookup(key) {
                match entry.status() {
                    Status::Alive if !entry.is_reclaimed() => {
                        entry.touch_access(self.now());
                        self.record_read(&entry);
                        self.inner.maintenance.stats().record_hit();
                        if let Some(value) = entry.value() {
                            return Ok(value);
                        }
                    }
                    Status::Loading => {
                        if let Some(waiter) = entry.load_waiter.clone() {
                            if let Some(value) = waiter.wait() {
                                self.inner.maintenance.stats().record_hit();
                                return Ok(value);
                            }
                        }
                        // The in-flight load failed or was removed; retry.
                        continue;
                    }
                    _ => {}
                }
            }

            let placeholder = Arc::new(Entry::new_placeholder(key.clone(), self.now()));
            let (installed, won) = self.inner.index.insert_if_absent(key.clone(), placeholder);
            if !won {
                // Someone else just installed a (placeholder or live) record;
                // loop back and observe it.
                continue;
            }

            self.inner.maintenance.stats().record_miss();
            let start = self.now();
            let result = loader.load(key);
            let elapsed = self.now().saturating_sub(start);

            let waiter = installed
                .load_waiter
                .clone()
                .expect("placeholder always carries a load waiter");

            return match result {
                Ok(value) => {
                    self.inner.maintenance.stats().record_load_success(elapsed);
                    let value = Arc::new(value);
                    let weight = self.weight_of(key, &value);
                    let record = Arc::new(Entry::new_alive(
                        key.clone(),
                        Arc::clone(&value),
                        weight,
                        self.now(),
                        self.inner.value_reclaim_probe,
                        self.inner.key_reclaim_probe,
                    ));
                    let replaced = self.inner.index.replace(key, &installed, record.clone());
                    debug_assert!(replaced, "placeholder must still be installed for its own key");
                    waiter.resolve(LoadOutcome::Value(Arc::clone(&value)));
                    self.inner.maintenance.submit_write(WriteTask::Add(record));
                    self.schedule();
                    Ok(value)
                }
                Err(error) => {
                    self.inner.maintenance.stats().record_load_failure(elapsed);
                    installed.set_status(Status::Dead);
                    self.inner.index.remove(key, &installed);
                    waiter.resolve(LoadOutcome::Failed);
                    Err(error)
                }
            };
        }
    }

    /// A snapshot of every present, unexpired entry among `keys`, in the
    /// order `keys` was iterated.
    pub fn get_all_present<I: IntoIterator<Item = K>>(&self, keys: I) -> IndexMap<K, Arc<V>> {
        let mut out = IndexMap::new();
        for key in keys {
            if let Some(entry) = self.inner.index.lookup(&key) {
                if self.is_live(&entry) {
                    entry.touch_access(self.now());
                    self.record_read(&entry);
                    if let Some(value) = entry.value() {
                        out.insert(key, value);
                    }
                }
            }
        }
        out
    }

    /// Computes values for every key in `keys` absent from the cache,
    /// preferring the loader's bulk `load_all` when available and falling
    /// back to individual single-flight loads otherwise. Duplicate keys
    /// are deduplicated, preserving first-occurrence order.
    ///
    /// # Errors
    ///
    /// Returns the first load failure encountered; already-installed
    /// mappings from earlier keys in this call are kept. The result
    /// preserves the (deduplicated) order `keys` was iterated.
    pub fn get_all<I, L>(&self, keys: I, loader: &L) -> Result<IndexMap<K, Arc<V>>>
    where
        I: IntoIterator<Item = K>,
        L: Loader<K, V>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut ordered_keys = Vec::new();
        for key in keys {
            if seen.insert(key.clone()) {
                ordered_keys.push(key);
            }
        }

        let mut out = IndexMap::with_capacity(ordered_keys.len());
        let mut missing = Vec::new();
        for key in &ordered_keys {
            if let Some(value) = self.get(key) {
                out.insert(key.clone(), value);
            } else {
                missing.push(key.clone());
            }
        }
        if missing.is_empty() {
            return Ok(out);
        }

        if let Some(loaded) = loader.load_all(&missing) {
            let mut loaded = loaded?;
            for key in &missing {
                match loaded.remove(key) {
                    Some(value) => {
                        let installed = self.insert_loaded(key.clone(), value);
                        out.insert(key.clone(), installed);
                    }
                    None => {
                        self.inner.maintenance.stats().record_load_failure(0);
                        return Err(Error::InvalidLoadResult(
                            "load_all result omitted a requested key".to_string(),
                        ));
                    }
                }
            }
            return Ok(out);
        }

        for key in missing {
            let value = self.get_with(&key, loader)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    fn insert_loaded(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.maintenance.stats().record_load_success(0);
        self.insert_arc(key, value.clone());
        value
    }

    /// Unconditional insert/replace. Fires `Replaced` if a live value is overwritten.
    pub fn insert(&self, key: K, value: V) {
        self.insert_arc(key, Arc::new(value));
    }

    fn insert_arc(&self, key: K, value: Arc<V>) {
        let now = self.now();
        let weight = self.weight_of(&key, &value);
        let record = Arc::new(Entry::new_alive(
            key.clone(),
            Arc::clone(&value),
            weight,
            now,
            self.inner.value_reclaim_probe,
            self.inner.key_reclaim_probe,
        ));
        let prior = self.inner.index.upsert(key, Arc::clone(&record));
        if let Some(prior) = prior {
            match prior.status() {
                Status::Alive => {
                    if prior.compare_exchange_status(Status::Alive, Status::Retired) {
                        self.inner
                            .maintenance
                            .submit_write(WriteTask::Remove(prior, RemovalCause::Replaced));
                    }
                }
                Status::Loading => {
                    // A concurrent `get_with` installed a placeholder for
                    // this key; wake its waiters with the value that just
                    // won the race instead of leaving them blocked forever.
                    prior.set_status(Status::Retired);
                    if let Some(waiter) = prior.load_waiter.clone() {
                        waiter.resolve(LoadOutcome::Value(value));
                    }
                    prior.set_status(Status::Dead);
                }
                Status::Retired | Status::Dead => {}
            }
        }
        self.inner.maintenance.submit_write(WriteTask::Add(record));
        self.schedule();
    }

    /// Inserts only if `key` is currently absent. Returns the prior value if any.
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<Arc<V>> {
        let now = self.now();
        let value = Arc::new(value);
        let weight = self.weight_of(&key, &value);
        let record = Arc::new(Entry::new_alive(
            key.clone(),
            value,
            weight,
            now,
            self.inner.value_reclaim_probe,
            self.inner.key_reclaim_probe,
        ));
        let (installed, won) = self.inner.index.insert_if_absent(key, Arc::clone(&record));
        if won {
            self.inner.maintenance.submit_write(WriteTask::Add(record));
            self.schedule();
            None
        } else {
            installed.value()
        }
    }

    /// Atomically replaces `key`'s value with `new` only if it currently
    /// equals `old` (by `Arc` identity of the stored record). Fires
    /// `Replaced` on success.
    pub fn compare_and_replace(&self, key: &K, old: &Arc<V>, new: V) -> bool {
        let Some(entry) = self.inner.index.lookup(key) else {
            return false;
        };
        if !self.is_live(&entry) {
            return false;
        }
        match entry.value() {
            Some(current) if Arc::ptr_eq(&current, old) => {
                let now = self.now();
                let new = Arc::new(new);
                let weight = self.weight_of(key, &new);
                entry.set_value(new);
                entry.record_write(now, weight);
                self.inner.maintenance.submit_write(WriteTask::Update(entry));
                self.schedule();
                true
            }
            _ => false,
        }
    }

    /// Replaces `key`'s value unconditionally if it is currently present.
    /// Returns `false` if `key` is absent.
    pub fn replace(&self, key: &K, value: V) -> bool {
        let Some(entry) = self.inner.index.lookup(key) else {
            return false;
        };
        if !self.is_live(&entry) {
            return false;
        }
        let now = self.now();
        let value = Arc::new(value);
        let weight = self.weight_of(key, &value);
        entry.set_value(value);
        entry.record_write(now, weight);
        self.inner.maintenance.submit_write(WriteTask::Update(entry));
        self.schedule();
        true
    }

    /// Removes `key`, firing `Explicit` if a live value was present.
    pub fn invalidate(&self, key: &K) {
        if let Some(entry) = self.inner.index.lookup(key) {
            self.invalidate_entry(key, &entry, RemovalCause::Explicit);
        }
    }

    fn invalidate_entry(&self, key: &K, entry: &Arc<Entry<K, V>>, cause: RemovalCause) {
        if entry.compare_exchange_status(Status::Alive, Status::Retired) {
            self.inner.index.remove(key, entry);
            self.inner
                .maintenance
                .submit_write(WriteTask::Remove(Arc::clone(entry), cause));
            self.schedule();
        }
    }

    /// Removes every key in `keys`.
    pub fn invalidate_all<I: IntoIterator<Item = K>>(&self, keys: I) {
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Removes every entry currently in the cache.
    pub fn invalidate_everything(&self) {
        let keys: Vec<K> = self.inner.index.iter().map(|(k, _)| k).collect();
        self.invalidate_all(keys);
    }

    /// Approximate count of live entries; may include entries pending
    /// their `Retired -> Dead` transition.
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        self.inner.index.len() as u64
    }

    /// Forces an immediate drain of the read/write buffers through the
    /// eviction policy, applying expiry and capacity enforcement eagerly.
    pub fn clean_up(&self) {
        self.inner
            .maintenance
            .force_drain(&self.inner.index, self.inner.ticker.as_ref());
    }

    /// An immutable snapshot of this cache's statistics. Zeroed unless
    /// `record_stats()` was set on the builder.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        if self.inner.record_stats {
            self.inner.maintenance.stats().snapshot()
        } else {
            CacheStats::default()
        }
    }

    /// A live, weakly-consistent view of the cache's present entries.
    /// Iteration never panics under concurrent mutation and may reflect
    /// any subset of mutations racing with it.
    #[must_use]
    pub fn as_map(&self) -> HashMap<K, Arc<V>> {
        let mut out = HashMap::new();
        for (key, entry) in self.inner.index.iter() {
            if self.is_live(&entry) {
                if let Some(value) = entry.value() {
                    out.insert(key, value);
                }
            }
        }
        out
    }
}

impl<K, V, S> std::fmt::Debug for Cache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}
