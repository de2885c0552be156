//! Scheduling drains of the read/write buffers through the eviction policy.
//!
//! A drain is never mandatory for correctness of the hot path (reads and
//! writes both stay lock-free), only for timeliness: buffered events need
//! to reach the policy eventually so capacity is enforced and expired
//! entries stop being visible. The coordinator below is the "opportunistic,
//! amortized" scheme this codebase already uses for its lock-free LRU
//! cache's generation bookkeeping, generalized to arbitrary policy state:
//! whichever caller notices work is pending tries to grab the eviction
//! lock and drain; if someone else is already draining, the state machine
//! guarantees that drainer loops at least once more before giving up the
//! lock.

use std::hash::Hash;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::entry::Entry;
use crate::index::HashIndex;
use crate::notification::RemovalListener;
use crate::policy::Policy;
use crate::stats::Counters;
use crate::ticker::Ticker;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle = 0,
    Required = 1,
    Processing = 2,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => State::Idle,
            1 => State::Required,
            _ => State::Processing,
        }
    }
}

/// How often the background `Housekeeper` forces a drain even if nothing
/// has signaled `Required`, so an idle cache still expires entries in
/// bounded wall-clock time.
const HOUSEKEEPER_INTERVAL: Duration = Duration::from_secs(1);

/// Coordinates opportunistic draining of the buffers through the policy.
///
/// Owns everything a drain touches except the hash index and loader, which
/// the cache facade passes in: the read/write buffers, the policy, the
/// stats counters, and the removal listener/executor pair used to dispatch
/// notifications once the eviction lock is released.
pub(crate) struct Maintenance<K, V> {
    state: AtomicU8,
    read_buffer: ReadBuffer<Arc<Entry<K, V>>>,
    write_buffer: WriteBuffer<K, V>,
    policy: Policy<K, V>,
    stats: Counters,
    listener: Option<RemovalListener<K, V>>,
    executor: Arc<dyn crate::executor::Executor>,
}

impl<K, V> Maintenance<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        policy: Policy<K, V>,
        listener: Option<RemovalListener<K, V>>,
        executor: Arc<dyn crate::executor::Executor>,
    ) -> Self {
        Self {
            state: AtomicU8::new(State::Idle as u8),
            read_buffer: ReadBuffer::new(),
            write_buffer: WriteBuffer::new(),
            policy,
            stats: Counters::default(),
            listener,
            executor,
        }
    }

    pub(crate) fn stats(&self) -> &Counters {
        &self.stats
    }

    pub(crate) fn policy(&self) -> &Policy<K, V> {
        &self.policy
    }

    pub(crate) fn record_read(&self, entry: Arc<Entry<K, V>>) {
        self.read_buffer.record(entry);
    }

    pub(crate) fn submit_write(&self, task: crate::buffer::WriteTask<K, V>) {
        self.write_buffer.submit(task);
    }

    pub(crate) fn pending_writes(&self) -> usize {
        self.write_buffer.len()
    }

    /// Signals that a drain should happen and opportunistically attempts
    /// one. Called after every buffered read and every write.
    pub(crate) fn schedule<S>(&self, index: &HashIndex<K, V, S>, ticker: &dyn Ticker)
    where
        S: std::hash::BuildHasher + Clone,
    {
        self.state.store(State::Required as u8, Ordering::Release);
        self.try_drain(index, ticker);
    }

    /// Forces a drain regardless of the current state, used by
    /// [`crate::cache::Cache::clean_up`] and the housekeeper.
    pub(crate) fn force_drain<S>(&self, index: &HashIndex<K, V, S>, ticker: &dyn Ticker)
    where
        S: std::hash::BuildHasher + Clone,
    {
        self.state.store(State::Required as u8, Ordering::Release);
        loop {
            if !self.try_drain(index, ticker) {
                // Someone else is mid-drain; our `Required` flag will make
                // them loop once more, which is sufficient.
                return;
            }
            if State::from_u8(self.state.load(Ordering::Acquire)) != State::Required {
                return;
            }
        }
    }

    /// Attempts to acquire the eviction lock and drain. Returns `true` if
    /// this call performed (or at least attempted) the drain, `false` if
    /// another thread currently holds it.
    fn try_drain<S>(&self, index: &HashIndex<K, V, S>, ticker: &dyn Ticker) -> bool
    where
        S: std::hash::BuildHasher + Clone,
    {
        loop {
            match self.state.compare_exchange(
                State::Required as u8,
                State::Processing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) if observed == State::Idle as u8 => return true,
                Err(_) => return false, // already Processing elsewhere
            }
        }

        loop {
            let now = ticker.now_nanos();
            let notifications = self
                .policy
                .drain(&self.read_buffer, &self.write_buffer, index, now, &self.stats);
            self.dispatch(notifications);

            // If nothing re-signaled `Required` while we were draining,
            // we're done; otherwise loop so the signaler never stalls
            // waiting for a future caller to notice.
            match self.state.compare_exchange(
                State::Processing as u8,
                State::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    fn dispatch(&self, notifications: Vec<crate::policy::PendingNotification<K, V>>) {
        if notifications.is_empty() {
            return;
        }
        let Some(listener) = self.listener.clone() else {
            return;
        };
        for crate::policy::PendingNotification { entry, cause } in notifications {
            let listener = Arc::clone(&listener);
            self.executor.execute(Box::new(move || {
                if let Some(value) = entry.value() {
                    listener(&entry.key, &value, cause);
                }
            }));
        }
    }
}

/// Background thread that forces a drain on a fixed cadence so an idle
/// cache still expires entries without waiting for another read or write.
///
/// Parked on its own condition variable rather than a bare sleep loop so
/// [`Housekeeper::stop`] can wake it immediately for a prompt shutdown
/// instead of waiting out the remainder of the interval.
pub(crate) struct Housekeeper {
    shutdown: Arc<(parking_lot::Mutex<bool>, parking_lot::Condvar)>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Housekeeper {
    pub(crate) fn spawn<F>(tick: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let shutdown = Arc::new((parking_lot::Mutex::new(false), parking_lot::Condvar::new()));
        let shutdown_bg = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("talon-cache-housekeeper".to_string())
            .spawn(move || {
                let (lock, condvar) = &*shutdown_bg;
                let mut stopped = lock.lock();
                loop {
                    let timed_out = condvar.wait_for(&mut stopped, HOUSEKEEPER_INTERVAL);
                    if *stopped {
                        return;
                    }
                    if timed_out.timed_out() {
                        tick();
                    }
                }
            })
            .expect("failed to spawn talon-cache housekeeper thread");
        Self {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        let (lock, condvar) = &*self.shutdown;
        *lock.lock() = true;
        condvar.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
