//! The validating front door that turns builder calls into a [`crate::cache::Cache`].
//!
//! Construction is an in-process API call, not a deployment-time concern,
//! so unlike the rest of this codebase's configuration surface there is no
//! file/env layer here -- just a plain builder, validated once in [`build`](CacheBuilder::build).

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::executor::{default_executor, Executor};
use crate::loader::Loader;
use crate::notification::RemovalListener;
use crate::reference::{WeakKey, WeakRef};
use crate::ticker::{SystemTicker, Ticker};

type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u64 + Send + Sync>;

/// Validated configuration handed from [`CacheBuilder::build`] to
/// [`Cache::from_config`]. Keeping this separate from `CacheBuilder` itself
/// means the builder can stay a plain bag of `Option`s while the cache only
/// ever sees a configuration that has already passed [`CacheBuilder::build`]'s checks.
pub(crate) struct Config<K, V, S> {
    pub(crate) initial_capacity: usize,
    pub(crate) max_weight: Option<u64>,
    pub(crate) weigher: Option<Weigher<K, V>>,
    pub(crate) expire_after_access_nanos: Option<u64>,
    pub(crate) expire_after_write_nanos: Option<u64>,
    pub(crate) refresh_after_write_nanos: Option<u64>,
    pub(crate) loader: Option<Arc<dyn Loader<K, V>>>,
    pub(crate) removal_listener: Option<RemovalListener<K, V>>,
    pub(crate) record_stats: bool,
    pub(crate) ticker: Arc<dyn Ticker>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) track_reclamation: bool,
    pub(crate) key_reclaim_probe: Option<fn(&K) -> bool>,
    pub(crate) value_reclaim_probe: Option<fn(&V) -> bool>,
    pub(crate) hasher: S,
}

/// Builds a [`Cache`]. Every setter consumes and returns `self`; call
/// [`build`](Self::build) last.
///
/// ```
/// use std::time::Duration;
/// use talon_cache::CacheBuilder;
///
/// let cache: talon_cache::Cache<String, u64> = CacheBuilder::new()
///     .max_size(10_000)
///     .expire_after_write(Duration::from_secs(300))
///     .record_stats()
///     .build()
///     .expect("valid configuration");
/// ```
pub struct CacheBuilder<K, V, S = RandomState> {
    initial_capacity: usize,
    max_size: Option<u64>,
    max_weight: Option<u64>,
    weigher: Option<Weigher<K, V>>,
    expire_after_access: Option<Duration>,
    expire_after_write: Option<Duration>,
    refresh_after_write: Option<Duration>,
    loader: Option<Arc<dyn Loader<K, V>>>,
    removal_listener: Option<RemovalListener<K, V>>,
    record_stats: bool,
    ticker: Option<Arc<dyn Ticker>>,
    executor: Option<Arc<dyn Executor>>,
    track_reclamation: bool,
    key_reclaim_probe: Option<fn(&K) -> bool>,
    value_reclaim_probe: Option<fn(&V) -> bool>,
    hasher: S,
}

impl<K, V> Default for CacheBuilder<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheBuilder<K, V, RandomState> {
    /// Creates a builder with every option unset.
    #[must_use]
    pub fn new() -> Self {
        Self {
            initial_capacity: 0,
            max_size: None,
            max_weight: None,
            weigher: None,
            expire_after_access: None,
            expire_after_write: None,
            refresh_after_write: None,
            loader: None,
            removal_listener: None,
            record_stats: false,
            ticker: None,
            executor: None,
            track_reclamation: false,
            key_reclaim_probe: None,
            value_reclaim_probe: None,
            hasher: RandomState::default(),
        }
    }
}

impl<K, V, S> CacheBuilder<K, V, S> {
    /// Sizing hint for the underlying hash index. Purely an allocation
    /// hint; never validated against `max_size`/`max_weight`.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Bounds the cache to at most `size` entries (a constant-1 weigher).
    /// Mutually exclusive with [`max_weight`](Self::max_weight).
    #[must_use]
    pub fn max_size(mut self, size: u64) -> Self {
        self.max_size = Some(size);
        self
    }

    /// Bounds the cache's total weight. Requires [`weigher`](Self::weigher).
    /// Mutually exclusive with [`max_size`](Self::max_size).
    #[must_use]
    pub fn max_weight(mut self, weight: u64) -> Self {
        self.max_weight = Some(weight);
        self
    }

    /// Supplies the per-entry weight function. Requires [`max_weight`](Self::max_weight).
    #[must_use]
    pub fn weigher<F>(mut self, weigher: F) -> Self
    where
        F: Fn(&K, &V) -> u64 + Send + Sync + 'static,
    {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    /// Expires entries `d` after their last read or write.
    /// `Duration::ZERO` collapses the whole cache to `max_size(0)`.
    #[must_use]
    pub fn expire_after_access(mut self, d: Duration) -> Self {
        self.expire_after_access = Some(d);
        self
    }

    /// Expires entries `d` after their last write, regardless of reads.
    /// `Duration::ZERO` collapses the whole cache to `max_size(0)`.
    #[must_use]
    pub fn expire_after_write(mut self, d: Duration) -> Self {
        self.expire_after_write = Some(d);
        self
    }

    /// Enables refresh-ahead: a `get` observing an entry older than `d`
    /// (by write time) returns the stale value immediately and schedules a
    /// background reload via [`loader`](Self::loader). Requires a loader.
    #[must_use]
    pub fn refresh_after_write(mut self, d: Duration) -> Self {
        self.refresh_after_write = Some(d);
        self
    }

    /// Registers the loader used for [`refresh_after_write`](Self::refresh_after_write).
    /// Independent of any loader passed directly to `get_with`.
    #[must_use]
    pub fn loader(mut self, loader: impl Loader<K, V> + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Registers a callback invoked on the cache's [`Executor`](crate::executor::Executor)
    /// whenever an entry leaves the cache. Panics inside the callback are
    /// caught and logged.
    #[must_use]
    pub fn removal_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&K, &V, crate::notification::RemovalCause) + Send + Sync + 'static,
    {
        self.removal_listener = Some(Arc::new(listener));
        self
    }

    /// Enables the statistics counters surfaced by [`Cache::stats`](crate::cache::Cache::stats).
    #[must_use]
    pub fn record_stats(mut self) -> Self {
        self.record_stats = true;
        self
    }

    /// Overrides the time source. Defaults to a monotonic [`SystemTicker`].
    #[must_use]
    pub fn ticker(mut self, ticker: impl Ticker + 'static) -> Self {
        self.ticker = Some(Arc::new(ticker));
        self
    }

    /// Overrides the background task dispatcher used for removal
    /// notifications and refresh loads. Defaults to an internal
    /// fixed-size worker pool.
    #[must_use]
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Rebuilds this builder with a different hasher for the internal
    /// hash index.
    #[must_use]
    pub fn with_hasher<S2>(self, hasher: S2) -> CacheBuilder<K, V, S2> {
        CacheBuilder {
            initial_capacity: self.initial_capacity,
            max_size: self.max_size,
            max_weight: self.max_weight,
            weigher: self.weigher,
            expire_after_access: self.expire_after_access,
            expire_after_write: self.expire_after_write,
            refresh_after_write: self.refresh_after_write,
            loader: self.loader,
            removal_listener: self.removal_listener,
            record_stats: self.record_stats,
            ticker: self.ticker,
            executor: self.executor,
            track_reclamation: self.track_reclamation,
            key_reclaim_probe: self.key_reclaim_probe,
            value_reclaim_probe: self.value_reclaim_probe,
            hasher,
        }
    }
}

/// Switches the key side to weak-reference identity equality (see
/// [`crate::reference::WeakKey`]) and enables the drain-time reclamation
/// scan. Only available once `K = WeakKey<Inner>`.
impl<Inner, V, S> CacheBuilder<WeakKey<Inner>, V, S>
where
    Inner: Hash + Eq + Send + Sync + 'static,
{
    #[must_use]
    pub fn weak_keys(mut self) -> Self {
        self.key_reclaim_probe = Some(crate::reference::key_is_reclaimed::<Inner>);
        self.track_reclamation = true;
        self
    }
}

/// Switches the value side to weak-reference semantics. Only available
/// once `V = WeakRef<Inner>`. `soft_values` is an alias: Rust's standard
/// library has no separate soft-reference tier, so it is modeled
/// identically (see `DESIGN.md`).
impl<K, Inner, S> CacheBuilder<K, WeakRef<Inner>, S>
where
    Inner: Send + Sync + 'static,
{
    #[must_use]
    pub fn weak_values(mut self) -> Self {
        self.value_reclaim_probe = Some(crate::reference::value_is_reclaimed::<Inner>);
        self.track_reclamation = true;
        self
    }

    #[must_use]
    pub fn soft_values(self) -> Self {
        self.weak_values()
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Validates the accumulated options and constructs the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `max_size` and `max_weight` are
    /// both set, if `weigher` is set without `max_weight`, or if
    /// `refresh_after_write` is set without a [`loader`](Self::loader).
    pub fn build(self) -> Result<Cache<K, V, S>> {
        if self.max_size.is_some() && self.max_weight.is_some() {
            return Err(Error::invalid_config(
                "max_size and max_weight are mutually exclusive",
            ));
        }
        if self.weigher.is_some() && self.max_weight.is_none() {
            return Err(Error::invalid_config("weigher requires max_weight"));
        }
        if self.refresh_after_write.is_some() && self.loader.is_none() {
            return Err(Error::invalid_config(
                "refresh_after_write requires a loader",
            ));
        }

        let zero_collapse = self.expire_after_access == Some(Duration::ZERO)
            || self.expire_after_write == Some(Duration::ZERO);

        let max_weight = if zero_collapse {
            Some(0)
        } else {
            self.max_weight.or(self.max_size)
        };
        let expire_after_access_nanos = if zero_collapse {
            None
        } else {
            self.expire_after_access.map(duration_as_nanos)
        };
        let expire_after_write_nanos = if zero_collapse {
            None
        } else {
            self.expire_after_write.map(duration_as_nanos)
        };

        let config = Config {
            initial_capacity: self.initial_capacity,
            max_weight,
            weigher: self.weigher,
            expire_after_access_nanos,
            expire_after_write_nanos,
            refresh_after_write_nanos: self.refresh_after_write.map(duration_as_nanos),
            loader: self.loader,
            removal_listener: self.removal_listener,
            record_stats: self.record_stats,
            ticker: self.ticker.unwrap_or_else(|| Arc::new(SystemTicker::new())),
            executor: self.executor.unwrap_or_else(default_executor),
            track_reclamation: self.track_reclamation,
            key_reclaim_probe: self.key_reclaim_probe,
            value_reclaim_probe: self.value_reclaim_probe,
            hasher: self.hasher,
        };

        Ok(Cache::from_config(config))
    }
}

fn duration_as_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
