//! Removal cause taxonomy and listener dispatch.

use std::sync::Arc;

/// Why an entry left the cache. Every `Retired -> Dead` transition produces
/// exactly one notification carrying exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// The user called `invalidate`/`invalidate_all`.
    Explicit,
    /// An `insert`/`replace` overwrote a live value.
    Replaced,
    /// A weak/soft key or value was reclaimed.
    Collected,
    /// `expire_after_access`/`expire_after_write` elapsed.
    Expired,
    /// Evicted to satisfy `max_size`/`max_weight`.
    Size,
}

impl RemovalCause {
    /// Whether this cause represents the cache discarding a value the user
    /// never explicitly asked to remove (used by callers that only want to
    /// react to involuntary evictions).
    #[must_use]
    pub fn was_evicted(&self) -> bool {
        !matches!(self, RemovalCause::Explicit | RemovalCause::Replaced)
    }
}

/// A callback invoked off the eviction lock, on the cache's [`crate::executor::Executor`],
/// whenever an entry leaves the cache. Panics inside the listener are
/// caught and logged; they never propagate to the drain.
pub(crate) type RemovalListener<K, V> = Arc<dyn Fn(&K, &V, RemovalCause) + Send + Sync>;
