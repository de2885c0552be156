//! Statistics accounting.
//!
//! Mirrors `CacheStats`/`CacheStats::hit_rate` in this codebase's existing
//! single-tier LRU cache, generalized with load accounting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live, atomically-updated counters. Cheap to update on every operation;
/// `recordStats` in the builder controls whether this is even wired up, but
/// the counters themselves are always present (updating a handful of
/// relaxed atomics is not worth special-casing away).
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    load_success: AtomicU64,
    load_failure: AtomicU64,
    total_load_nanos: AtomicU64,
    evictions: AtomicU64,
    eviction_weight: AtomicU64,
}

impl Counters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load_success(&self, nanos: u64) {
        self.load_success.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn record_load_failure(&self, nanos: u64) {
        self.load_failure.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self, weight: u64) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.eviction_weight.fetch_add(weight, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            load_success_count: self.load_success.load(Ordering::Relaxed),
            load_failure_count: self.load_failure.load(Ordering::Relaxed),
            total_load_time_nanos: self.total_load_nanos.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            eviction_weight: self.eviction_weight.load(Ordering::Relaxed),
        }
    }
}

/// An immutable point-in-time snapshot of a cache's statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheStats {
    /// Number of times `get`/`get_with` returned a cached value.
    pub hit_count: u64,
    /// Number of times a lookup found no live value.
    pub miss_count: u64,
    /// Number of loader invocations that completed successfully.
    pub load_success_count: u64,
    /// Number of loader invocations that failed.
    pub load_failure_count: u64,
    /// Cumulative nanoseconds spent inside loader invocations.
    pub total_load_time_nanos: u64,
    /// Number of entries evicted due to size/weight or expiration.
    pub eviction_count: u64,
    /// Cumulative weight of evicted entries.
    pub eviction_weight: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, in `[0.0, 1.0]`. `0.0` when there
    /// have been no lookups at all.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            (self.hit_count as f64 / total as f64)
        }
    }

    /// Average nanoseconds per loader invocation (success or failure).
    #[must_use]
    pub fn average_load_penalty_nanos(&self) -> f64 {
        let total = self.load_success_count + self.load_failure_count;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            (self.total_load_time_nanos as f64 / total as f64)
        }
    }
}
