//! The lossless write buffer.
//!
//! Backed by a bounded [`crossbeam_channel`], the same channel primitive
//! this codebase already depends on. A bounded channel with a blocking
//! `send` satisfies the "lossless" contract without unbounded memory growth
//! under a sustained burst: producers stall rather than drop, so throughput
//! is governed by drain cadence, never by silent loss.

use crossbeam_channel::{Receiver, Sender};

/// Capacity of the write-task channel. Generous relative to
/// [`super::read::ReadBuffer`]'s per-stripe ring, since losing a write task
/// would violate the write buffer's contract outright (unlike a read
/// event, which is only ever a recency hint).
const CHANNEL_CAPACITY: usize = 2048;

/// A write/mutation task queued for the policy to apply during a drain.
/// `Add`/`Update`/`Remove` arrive from explicit cache operations; `Expire`
/// and the `Refresh*` pair arrive from the policy itself (the drain thread
/// enqueueing to its own buffer, applied on the next pass so ordering with
/// any concurrently-submitted task is preserved).
pub(crate) enum WriteTask<K, V> {
    Add(std::sync::Arc<crate::entry::Entry<K, V>>),
    Update(std::sync::Arc<crate::entry::Entry<K, V>>),
    Remove(std::sync::Arc<crate::entry::Entry<K, V>>, crate::notification::RemovalCause),
    RefreshStart(std::sync::Arc<crate::entry::Entry<K, V>>),
    RefreshEnd(std::sync::Arc<crate::entry::Entry<K, V>>),
}

pub(crate) struct WriteBuffer<K, V> {
    sender: Sender<WriteTask<K, V>>,
    receiver: Receiver<WriteTask<K, V>>,
}

impl<K, V> WriteBuffer<K, V> {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        Self { sender, receiver }
    }

    /// Lossless: blocks the caller if the channel is momentarily full
    /// rather than dropping the task.
    pub(crate) fn submit(&self, task: WriteTask<K, V>) {
        // `send` only errs if every receiver has been dropped, which cannot
        // happen while `self` (which owns one) is alive.
        let _ = self.sender.send(task);
    }

    /// FIFO drain of every task queued so far. Called by the policy under
    /// the eviction lock.
    pub(crate) fn drain(&self, mut f: impl FnMut(WriteTask<K, V>)) {
        for task in self.receiver.try_iter() {
            f(task);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sender.len()
    }
}
