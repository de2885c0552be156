//! Per-entry state.
//!
//! Timestamp and status fields are touched by every reader and writer that
//! ever names this key, so they are grouped and padded with
//! [`CachePadded`](crossbeam_utils::CachePadded) to keep them off the cache
//! line shared with the (read-mostly) weight and value fields. This is a
//! performance concern only: correctness never depends on timestamp writes
//! being anything stronger than relaxed, because the read/write buffers are
//! what establish ordering between events (see `policy`), not the
//! timestamps themselves.

use arc_swap::ArcSwapOption;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Sentinel meaning "not linked into this policy list".
pub(crate) const NONE_SLOT: u32 = u32::MAX;

/// Lifecycle status of an [`Entry`].
///
/// `Loading` is a pragmatic fourth state beyond the three the design
/// describes (`Alive`/`Retired`/`Dead`): it is the placeholder phase a
/// single-flight load occupies before the winning caller either installs a
/// value (`Loading -> Alive`) or gives up (`Loading -> Dead`, skipping
/// `Retired` since the placeholder was never visible to readers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Status {
    Loading = 0,
    Alive = 1,
    Retired = 2,
    Dead = 3,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Status::Loading,
            1 => Status::Alive,
            2 => Status::Retired,
            _ => Status::Dead,
        }
    }
}

#[derive(Debug, Default)]
struct HotFields {
    write_time: AtomicU64,
    access_time: AtomicU64,
    status: AtomicU8,
}

/// Outcome of a single-flight load, communicated from the winning caller to
/// everyone else blocked on the same key.
pub(crate) enum LoadOutcome<V> {
    Value(Arc<V>),
    Failed,
}

/// The rendezvous point concurrent `get_with` callers for the same absent
/// key block on. The winner computes; everyone else waits on the condvar
/// rather than recomputing.
pub(crate) struct LoadWaiter<V> {
    state: Mutex<Option<LoadOutcome<V>>>,
    condvar: Condvar,
}

impl<V> LoadWaiter<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until the winning caller resolves the load.
    pub(crate) fn wait(&self) -> Option<Arc<V>> {
        let mut guard = self.state.lock();
        while guard.is_none() {
            self.condvar.wait(&mut guard);
        }
        match guard.take() {
            Some(LoadOutcome::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn resolve(&self, outcome: LoadOutcome<V>) {
        let mut guard = self.state.lock();
        *guard = Some(outcome);
        self.condvar.notify_all();
    }
}

/// A single cache entry: key, value, and all policy bookkeeping.
///
/// Arena links (`access_prev`/`access_next`/`write_prev`/`write_next`) are
/// only ever mutated by whichever thread holds the eviction lock; they are
/// stored as atomics purely so the struct is `Sync` to share through
/// `DashMap`, not because concurrent writers are expected.
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    value: ArcSwapOption<V>,
    weight: AtomicU64,
    hot: CachePadded<HotFields>,
    refreshing: AtomicBool,
    pub(crate) load_waiter: Option<Arc<LoadWaiter<V>>>,
    pub(crate) value_reclaim_probe: Option<fn(&V) -> bool>,
    pub(crate) key_reclaim_probe: Option<fn(&K) -> bool>,
    pub(crate) slot: AtomicU32,
    pub(crate) access_prev: AtomicU32,
    pub(crate) access_next: AtomicU32,
    pub(crate) write_prev: AtomicU32,
    pub(crate) write_next: AtomicU32,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new_alive(
        key: K,
        value: Arc<V>,
        weight: u64,
        now: u64,
        value_reclaim_probe: Option<fn(&V) -> bool>,
        key_reclaim_probe: Option<fn(&K) -> bool>,
    ) -> Self {
        let entry = Self {
            key,
            value: ArcSwapOption::from(Some(value)),
            weight: AtomicU64::new(weight),
            hot: CachePadded::new(HotFields::default()),
            refreshing: AtomicBool::new(false),
            load_waiter: None,
            value_reclaim_probe,
            key_reclaim_probe,
            slot: AtomicU32::new(NONE_SLOT),
            access_prev: AtomicU32::new(NONE_SLOT),
            access_next: AtomicU32::new(NONE_SLOT),
            write_prev: AtomicU32::new(NONE_SLOT),
            write_next: AtomicU32::new(NONE_SLOT),
        };
        entry.hot.write_time.store(now, Ordering::Relaxed);
        entry.hot.access_time.store(now, Ordering::Relaxed);
        entry.hot.status.store(Status::Alive as u8, Ordering::Relaxed);
        entry
    }

    pub(crate) fn new_placeholder(key: K, now: u64) -> Self {
        Self {
            key,
            value: ArcSwapOption::from(None),
            weight: AtomicU64::new(0),
            hot: CachePadded::new(HotFields {
                write_time: AtomicU64::new(now),
                access_time: AtomicU64::new(now),
                status: AtomicU8::new(Status::Loading as u8),
            }),
            refreshing: AtomicBool::new(false),
            load_waiter: Some(Arc::new(LoadWaiter::new())),
            value_reclaim_probe: None,
            key_reclaim_probe: None,
            slot: AtomicU32::new(NONE_SLOT),
            access_prev: AtomicU32::new(NONE_SLOT),
            access_next: AtomicU32::new(NONE_SLOT),
            write_prev: AtomicU32::new(NONE_SLOT),
            write_next: AtomicU32::new(NONE_SLOT),
        }
    }

    pub(crate) fn status(&self) -> Status {
        Status::from_u8(self.hot.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.hot.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn compare_exchange_status(&self, current: Status, new: Status) -> bool {
        self.hot
            .status
            .compare_exchange(
                current as u8,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn value(&self) -> Option<Arc<V>> {
        self.value.load_full()
    }

    pub(crate) fn set_value(&self, value: Arc<V>) {
        self.value.store(Some(value));
    }

    pub(crate) fn weight(&self) -> u64 {
        self.weight.load(Ordering::Relaxed)
    }

    pub(crate) fn write_time(&self) -> u64 {
        self.hot.write_time.load(Ordering::Relaxed)
    }

    pub(crate) fn access_time(&self) -> u64 {
        self.hot.access_time.load(Ordering::Relaxed)
    }

    pub(crate) fn touch_access(&self, now: u64) {
        self.hot.access_time.store(now, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, now: u64, weight: u64) {
        self.hot.write_time.store(now, Ordering::Relaxed);
        self.hot.access_time.store(now, Ordering::Relaxed);
        self.weight.store(weight, Ordering::Relaxed);
    }

    pub(crate) fn try_start_refresh(&self) -> bool {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_refresh(&self) {
        self.refreshing.store(false, Ordering::Release);
    }

    /// Whether this entry's weak key or weak/soft value has been
    /// reclaimed. Always `false` for ordinary strong-referenced entries.
    pub(crate) fn is_reclaimed(&self) -> bool {
        if let Some(probe) = self.key_reclaim_probe {
            if probe(&self.key) {
                return true;
            }
        }
        if let Some(probe) = self.value_reclaim_probe {
            if let Some(v) = self.value() {
                if probe(&v) {
                    return true;
                }
            }
        }
        false
    }
}
