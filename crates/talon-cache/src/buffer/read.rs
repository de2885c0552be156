//! Per-stripe lossy ring buffer of recent read events.
//!
//! Losing events is acceptable by design: the access-order list is only an
//! *approximation* of LRU, and a dropped read event merely delays that
//! record's recency promotion until its next read. This is what lets the
//! fast read path stay off the eviction lock entirely.
//!
//! Events carry a clone of the entry handle itself (`Arc<Entry<K, V>>`)
//! rather than its arena slot: a freshly-inserted entry is visible to
//! readers (and so can generate a read event) before the policy has had a
//! chance to drain its `Add` task and assign it a slot, so the slot isn't a
//! stable enough identity to buffer.

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Ring capacity per stripe. Past this many unconsumed events, a stripe
/// starts silently dropping new ones until the next drain.
const STRIPE_CAPACITY: usize = 64;

struct Stripe<T> {
    events: Mutex<Vec<T>>,
}

impl<T> Stripe<T> {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::with_capacity(STRIPE_CAPACITY)),
        }
    }
}

/// A collection of per-stripe ring buffers. The number of stripes scales
/// with expected hardware parallelism (next power of two at least as large
/// as the available parallelism, capped) to keep contention between
/// unrelated threads low.
pub(crate) struct ReadBuffer<T> {
    stripes: Vec<CachePadded<Stripe<T>>>,
    mask: usize,
}

impl<T> ReadBuffer<T> {
    pub(crate) fn new() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);
        let stripe_count = parallelism.next_power_of_two().clamp(4, 128);
        let stripes = (0..stripe_count)
            .map(|_| CachePadded::new(Stripe::new()))
            .collect();
        Self {
            stripes,
            mask: stripe_count - 1,
        }
    }

    fn stripe_index(&self) -> usize {
        let mut hasher = FxHasher::default();
        std::thread::current().id().hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    /// Records a read. Drops the event silently if the stripe's ring is
    /// currently full.
    pub(crate) fn record(&self, item: T) {
        let stripe = &self.stripes[self.stripe_index()];
        let mut events = stripe.events.lock();
        if events.len() < STRIPE_CAPACITY {
            events.push(item);
        }
    }

    /// Drains every stripe, applying `f` to each recorded item in the order
    /// observed within that stripe. Called by the policy under the
    /// eviction lock.
    pub(crate) fn drain(&self, mut f: impl FnMut(T)) {
        for stripe in &self.stripes {
            let mut events = stripe.events.lock();
            for item in events.drain(..) {
                f(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_drains_in_order() {
        let buf: ReadBuffer<u32> = ReadBuffer::new();
        buf.record(1);
        buf.record(2);
        buf.record(3);
        let mut seen = Vec::new();
        buf.drain(|slot| seen.push(slot));
        assert_eq!(seen, vec![1, 2, 3]);

        // A second drain with no intervening records yields nothing.
        let mut seen2 = Vec::new();
        buf.drain(|slot| seen2.push(slot));
        assert!(seen2.is_empty());
    }

    #[test]
    fn drops_events_past_capacity_without_panicking() {
        let buf: ReadBuffer<u32> = ReadBuffer::new();
        for i in 0..(STRIPE_CAPACITY as u32 * 2) {
            buf.record(i);
        }
        let mut seen = Vec::new();
        buf.drain(|slot| seen.push(slot));
        assert!(seen.len() <= STRIPE_CAPACITY);
    }
}
