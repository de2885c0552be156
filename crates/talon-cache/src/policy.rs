//! The eviction policy: access-order and write-order lists, weighted
//! capacity enforcement, time-based expiration, and reclamation scanning.
//!
//! Everything in this module runs under a single exclusive lock (the
//! *eviction lock*) held by whichever caller is currently draining. Records
//! are linked into the access/write lists via arena slot indices rather
//! than raw intrusive pointers, which keeps the list manipulation in safe
//! Rust: a doubly-linked list of `Arc<Entry>` with back-pointers is exactly
//! the "shared mutable graph" this design avoids (see `SPEC_FULL.md` §9) by
//! addressing nodes through a small `Vec`-backed arena instead.

use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;

use crate::buffer::{ReadBuffer, WriteBuffer, WriteTask};
use crate::entry::{Entry, Status, NONE_SLOT};
use crate::index::HashIndex;
use crate::notification::RemovalCause;
use crate::stats::Counters;

/// How many reclamation candidates a single drain will probe, bounding the
/// extra latency `weak_keys`/`weak_values` adds to a drain that would
/// otherwise be dominated by the (sorted, early-terminating) expiry scans.
const RECLAIM_SCAN_LIMIT: usize = 256;

/// Validated, immutable-after-construction policy configuration, handed
/// down from [`crate::builder::CacheBuilder`].
pub(crate) struct PolicyConfig {
    pub(crate) max_weight: Option<u64>,
    pub(crate) expire_after_access_nanos: Option<u64>,
    pub(crate) expire_after_write_nanos: Option<u64>,
    pub(crate) track_reclamation: bool,
}

impl PolicyConfig {
    fn tracks_write_order(&self) -> bool {
        self.expire_after_write_nanos.is_some()
    }
}

struct Node<K, V> {
    entry: Arc<Entry<K, V>>,
    /// Weight this node last contributed to `total_weight`, so an `Update`
    /// can apply just the delta instead of re-summing everything.
    linked_weight: u64,
}

/// The mutable state guarded by the eviction lock.
struct PolicyState<K, V> {
    arena: Vec<Option<Node<K, V>>>,
    free: Vec<u32>,
    access_head: u32,
    access_tail: u32,
    write_head: u32,
    write_tail: u32,
    total_weight: u64,
}

impl<K, V> PolicyState<K, V> {
    fn new() -> Self {
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            access_head: NONE_SLOT,
            access_tail: NONE_SLOT,
            write_head: NONE_SLOT,
            write_tail: NONE_SLOT,
            total_weight: 0,
        }
    }

    fn alloc(&mut self, entry: Arc<Entry<K, V>>) -> u32 {
        let weight = entry.weight();
        let node = Node {
            entry: Arc::clone(&entry),
            linked_weight: weight,
        };
        let slot = if let Some(slot) = self.free.pop() {
            self.arena[slot as usize] = Some(node);
            slot
        } else {
            self.arena.push(Some(node));
            (self.arena.len() - 1) as u32
        };
        entry.slot.store(slot, std::sync::atomic::Ordering::Relaxed);
        self.total_weight += weight;
        slot
    }

    fn node(&self, slot: u32) -> &Node<K, V> {
        self.arena[slot as usize]
            .as_ref()
            .expect("slot must be occupied while linked")
    }

    fn link_access_tail(&mut self, slot: u32) {
        self.node(slot).entry.access_prev.store(self.access_tail, std::sync::atomic::Ordering::Relaxed);
        self.node(slot).entry.access_next.store(NONE_SLOT, std::sync::atomic::Ordering::Relaxed);
        if self.access_tail != NONE_SLOT {
            self.node(self.access_tail)
                .entry
                .access_next
                .store(slot, std::sync::atomic::Ordering::Relaxed);
        } else {
            self.access_head = slot;
        }
        self.access_tail = slot;
    }

    fn unlink_access(&mut self, slot: u32) {
        use std::sync::atomic::Ordering::Relaxed;
        let (prev, next) = {
            let entry = &self.node(slot).entry;
            (entry.access_prev.load(Relaxed), entry.access_next.load(Relaxed))
        };
        if prev != NONE_SLOT {
            self.node(prev).entry.access_next.store(next, Relaxed);
        } else {
            self.access_head = next;
        }
        if next != NONE_SLOT {
            self.node(next).entry.access_prev.store(prev, Relaxed);
        } else {
            self.access_tail = prev;
        }
    }

    fn link_write_tail(&mut self, slot: u32) {
        use std::sync::atomic::Ordering::Relaxed;
        self.node(slot).entry.write_prev.store(self.write_tail, Relaxed);
        self.node(slot).entry.write_next.store(NONE_SLOT, Relaxed);
        if self.write_tail != NONE_SLOT {
            self.node(self.write_tail).entry.write_next.store(slot, Relaxed);
        } else {
            self.write_head = slot;
        }
        self.write_tail = slot;
    }

    fn unlink_write(&mut self, slot: u32) {
        use std::sync::atomic::Ordering::Relaxed;
        let (prev, next) = {
            let entry = &self.node(slot).entry;
            (entry.write_prev.load(Relaxed), entry.write_next.load(Relaxed))
        };
        if prev != NONE_SLOT {
            self.node(prev).entry.write_next.store(next, Relaxed);
        } else {
            self.write_head = next;
        }
        if next != NONE_SLOT {
            self.node(next).entry.write_prev.store(prev, Relaxed);
        } else {
            self.write_tail = prev;
        }
    }

    /// Fully unlinks `slot` from both lists, frees it, and returns the
    /// weight it was contributing.
    fn retire_slot(&mut self, slot: u32, track_write_order: bool) -> u64 {
        self.unlink_access(slot);
        if track_write_order {
            self.unlink_write(slot);
        }
        let node = self.arena[slot as usize].take().expect("slot must be occupied");
        node.entry.slot.store(NONE_SLOT, std::sync::atomic::Ordering::Relaxed);
        self.free.push(slot);
        self.total_weight -= node.linked_weight;
        node.linked_weight
    }
}

/// A removal pending dispatch once the eviction lock is released.
pub(crate) struct PendingNotification<K, V> {
    pub(crate) entry: Arc<Entry<K, V>>,
    pub(crate) cause: RemovalCause,
}

pub(crate) struct Policy<K, V> {
    config: PolicyConfig,
    state: Mutex<PolicyState<K, V>>,
}

impl<K, V> Policy<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PolicyState::new()),
        }
    }

    /// Approximate count of linked (i.e. drained-and-alive) entries.
    pub(crate) fn estimated_size(&self) -> usize {
        let state = self.state.lock();
        state.arena.len() - state.free.len()
    }

    /// Applies every buffered read and write event, then runs expiry,
    /// reclamation, and weight enforcement. Returns the notifications that
    /// must be dispatched once the caller releases the lock.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn drain<S>(
        &self,
        read_buffer: &ReadBuffer<Arc<Entry<K, V>>>,
        write_buffer: &WriteBuffer<K, V>,
        index: &HashIndex<K, V, S>,
        now: u64,
        stats: &Counters,
    ) -> Vec<PendingNotification<K, V>>
    where
        S: std::hash::BuildHasher + Clone,
    {
        let mut notifications = Vec::new();
        let mut state = self.state.lock();
        let track_write_order = self.config.tracks_write_order();

        read_buffer.drain(|entry| apply_read_event(&mut state, &entry));

        write_buffer.drain(|task| apply_write_task(&mut state, task, track_write_order, &mut notifications));

        if self.config.track_reclamation {
            reclaim_scan(&mut state, index, track_write_order, stats, &mut notifications);
        }

        if let Some(threshold) = self.config.expire_after_access_nanos {
            expire_access(&mut state, now, threshold, index, track_write_order, stats, &mut notifications);
        }

        if let Some(threshold) = self.config.expire_after_write_nanos {
            expire_write(&mut state, now, threshold, index, track_write_order, stats, &mut notifications);
        }

        enforce_weight(&mut state, self.config.max_weight, index, track_write_order, stats, &mut notifications);

        notifications
    }
}

fn apply_read_event<K, V>(state: &mut PolicyState<K, V>, entry: &Arc<Entry<K, V>>) {
    let slot = entry.slot.load(std::sync::atomic::Ordering::Relaxed);
    if slot == NONE_SLOT || entry.status() != Status::Alive {
        // Not yet linked (its `Add` hasn't drained) or no longer alive;
        // either way there is nothing to reorder.
        return;
    }
    state.unlink_access(slot);
    state.link_access_tail(slot);
}

fn apply_write_task<K, V>(
    state: &mut PolicyState<K, V>,
    task: WriteTask<K, V>,
    track_write_order: bool,
    notifications: &mut Vec<PendingNotification<K, V>>,
) {
    match task {
        WriteTask::Add(entry) => {
            if entry.status() != Status::Alive {
                // Placeholder resolved to a failure before this task
                // drained; nothing to link.
                return;
            }
            let slot = state.alloc(Arc::clone(&entry));
            state.link_access_tail(slot);
            if track_write_order {
                state.link_write_tail(slot);
            }
        }
        WriteTask::Update(entry) => {
            let slot = entry.slot.load(std::sync::atomic::Ordering::Relaxed);
            if slot == NONE_SLOT {
                // The `Add` for this entry hasn't drained yet; the pending
                // `Add` will pick up the current (already-updated) weight.
                return;
            }
            let new_weight = entry.weight();
            let delta = new_weight as i64 - state.node(slot).linked_weight as i64;
            state.total_weight = (state.total_weight as i64 + delta) as u64;
            state.arena[slot as usize].as_mut().unwrap().linked_weight = new_weight;
            state.unlink_access(slot);
            state.link_access_tail(slot);
            if track_write_order {
                state.unlink_write(slot);
                state.link_write_tail(slot);
            }
        }
        WriteTask::Remove(entry, cause) => {
            let slot = entry.slot.load(std::sync::atomic::Ordering::Relaxed);
            if slot != NONE_SLOT {
                state.retire_slot(slot, track_write_order);
            }
            entry.set_status(Status::Dead);
            notifications.push(PendingNotification { entry, cause });
        }
        WriteTask::RefreshStart(_) | WriteTask::RefreshEnd(_) => {
            // Bookkeeping only; the `refreshing` flag on the entry itself
            // is what actually gates single-flight refresh (see
            // `cache.rs`). These tasks exist so refresh transitions appear
            // in the same ordered stream as every other mutation.
        }
    }
}

/// Retires the entry linked at `slot` for `cause`, unlinking it from both
/// lists and freeing the slot.
///
/// A concurrent explicit `invalidate` may have already won the race to
/// retire this same entry (it CASes `Alive -> Retired` without taking the
/// eviction lock). When that happens this function still unlinks the slot
/// -- the entry must come out of the lists regardless -- but does not emit
/// a notification or touch the index: the invalidate's own `Remove` write
/// task owns that and will run later in this same drain or the next one.
///
/// Any cause `RemovalCause::was_evicted()` reports as involuntary (`Size`,
/// `Expired`, `Collected`) is counted against `stats` on the winning path,
/// so `CacheStats::eviction_count`/`eviction_weight` reflect every
/// involuntary removal, not just weight-driven ones.
fn try_retire<K, V, S>(
    state: &mut PolicyState<K, V>,
    slot: u32,
    entry: Arc<Entry<K, V>>,
    cause: RemovalCause,
    index: &HashIndex<K, V, S>,
    track_write_order: bool,
    stats: &Counters,
    notifications: &mut Vec<PendingNotification<K, V>>,
) -> Option<u64>
where
    K: Eq + Hash + Clone,
    S: std::hash::BuildHasher + Clone,
{
    let won = entry.compare_exchange_status(Status::Alive, Status::Retired);
    if won {
        index.remove(&entry.key, &entry);
    }
    let weight = state.retire_slot(slot, track_write_order);
    if won {
        entry.set_status(Status::Dead);
        if cause.was_evicted() {
            stats.record_eviction(weight);
        }
        notifications.push(PendingNotification { entry, cause });
        Some(weight)
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn expire_access<K, V, S>(
    state: &mut PolicyState<K, V>,
    now: u64,
    threshold_nanos: u64,
    index: &HashIndex<K, V, S>,
    track_write_order: bool,
    stats: &Counters,
    notifications: &mut Vec<PendingNotification<K, V>>,
) where
    K: Eq + Hash + Clone,
    S: std::hash::BuildHasher + Clone,
{
    loop {
        let head = state.access_head;
        if head == NONE_SLOT {
            break;
        }
        let entry = Arc::clone(&state.node(head).entry);
        if now.saturating_sub(entry.access_time()) < threshold_nanos {
            // Sorted by recency: the first non-expired record terminates
            // the scan.
            break;
        }
        try_retire(state, head, entry, RemovalCause::Expired, index, track_write_order, stats, notifications);
    }
}

#[allow(clippy::too_many_arguments)]
fn expire_write<K, V, S>(
    state: &mut PolicyState<K, V>,
    now: u64,
    threshold_nanos: u64,
    index: &HashIndex<K, V, S>,
    track_write_order: bool,
    stats: &Counters,
    notifications: &mut Vec<PendingNotification<K, V>>,
) where
    K: Eq + Hash + Clone,
    S: std::hash::BuildHasher + Clone,
{
    loop {
        let head = state.write_head;
        if head == NONE_SLOT {
            break;
        }
        let entry = Arc::clone(&state.node(head).entry);
        if now.saturating_sub(entry.write_time()) < threshold_nanos {
            break;
        }
        try_retire(state, head, entry, RemovalCause::Expired, index, track_write_order, stats, notifications);
    }
}

fn reclaim_scan<K, V, S>(
    state: &mut PolicyState<K, V>,
    index: &HashIndex<K, V, S>,
    track_write_order: bool,
    stats: &Counters,
    notifications: &mut Vec<PendingNotification<K, V>>,
) where
    K: Eq + Hash + Clone,
    S: std::hash::BuildHasher + Clone,
{
    let mut slot = state.access_head;
    let mut visited = 0;
    while slot != NONE_SLOT && visited < RECLAIM_SCAN_LIMIT {
        let entry = Arc::clone(&state.node(slot).entry);
        let next = entry.access_next.load(std::sync::atomic::Ordering::Relaxed);
        if entry.is_reclaimed() {
            try_retire(state, slot, entry, RemovalCause::Collected, index, track_write_order, stats, notifications);
        }
        slot = next;
        visited += 1;
    }
}

fn enforce_weight<K, V, S>(
    state: &mut PolicyState<K, V>,
    max_weight: Option<u64>,
    index: &HashIndex<K, V, S>,
    track_write_order: bool,
    stats: &Counters,
    notifications: &mut Vec<PendingNotification<K, V>>,
) where
    K: Eq + Hash + Clone,
    S: std::hash::BuildHasher + Clone,
{
    let Some(max_weight) = max_weight else {
        return;
    };
    while state.total_weight > max_weight {
        let head = state.access_head;
        if head == NONE_SLOT {
            break;
        }
        let entry = Arc::clone(&state.node(head).entry);
        try_retire(state, head, entry, RemovalCause::Size, index, track_write_order, stats, notifications);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ReadBuffer, WriteBuffer, WriteTask};
    use crate::index::HashIndex;
    use std::collections::hash_map::RandomState;

    fn insert(
        policy: &Policy<u64, &'static str>,
        index: &HashIndex<u64, &'static str, RandomState>,
        write_buffer: &WriteBuffer<u64, &'static str>,
        key: u64,
        value: &'static str,
        weight: u64,
        now: u64,
    ) {
        let entry = Arc::new(Entry::new_alive(key, Arc::new(value), weight, now, None, None));
        index.upsert(key, Arc::clone(&entry));
        write_buffer.submit(WriteTask::Add(entry));
        let read_buffer = ReadBuffer::new();
        policy.drain(&read_buffer, write_buffer, index, now, &Counters::default());
    }

    #[test]
    fn weight_enforcement_evicts_least_recently_used_first() {
        let policy = Policy::new(PolicyConfig {
            max_weight: Some(10),
            expire_after_access_nanos: None,
            expire_after_write_nanos: None,
            track_reclamation: false,
        });
        let index: HashIndex<u64, &'static str, RandomState> =
            HashIndex::with_capacity_and_hasher(8, RandomState::default());
        let write_buffer = WriteBuffer::new();

        insert(&policy, &index, &write_buffer, 1, "a", 3, 0);
        insert(&policy, &index, &write_buffer, 2, "b", 4, 0);
        insert(&policy, &index, &write_buffer, 3, "c", 2, 0);
        assert_eq!(policy.estimated_size(), 3);

        insert(&policy, &index, &write_buffer, 4, "d", 5, 0);

        assert!(index.lookup(&1).is_none(), "oldest entry should be evicted");
        assert!(index.lookup(&2).is_none(), "second-oldest entry should be evicted");
        assert!(index.lookup(&3).is_some());
        assert!(index.lookup(&4).is_some());
    }

    #[test]
    fn write_order_expiry_evicts_only_stale_entries() {
        let policy = Policy::new(PolicyConfig {
            max_weight: None,
            expire_after_access_nanos: None,
            expire_after_write_nanos: Some(10),
            track_reclamation: false,
        });
        let index: HashIndex<u64, &'static str, RandomState> =
            HashIndex::with_capacity_and_hasher(8, RandomState::default());
        let write_buffer = WriteBuffer::new();

        insert(&policy, &index, &write_buffer, 1, "a", 1, 0);
        insert(&policy, &index, &write_buffer, 2, "b", 1, 5);

        let read_buffer = ReadBuffer::new();
        policy.drain(&read_buffer, &write_buffer, &index, 11, &Counters::default());

        assert!(index.lookup(&1).is_none(), "entry written at t=0 should have expired by t=11");
        assert!(index.lookup(&2).is_some(), "entry written at t=5 is not yet stale at t=11");
    }
}
