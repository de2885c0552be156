//! Background task dispatch for removal notifications and refresh loads.
//!
//! The eviction lock never runs user code synchronously; everything it
//! would otherwise call directly (a removal listener, a refresh reload) is
//! handed to an [`Executor`] instead. The default is a small fixed-size
//! worker pool; callers with their own async runtime can supply their own
//! [`Executor`] impl (e.g. one that spawns onto a `tokio` runtime) via
//! [`crate::builder::CacheBuilder::executor`].

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

/// A task dispatcher. `execute` must not block the caller for long; the
/// eviction lock is held by whoever is submitting in the common case
/// (removal notifications fire while still inside the drain's bookkeeping,
/// before the lock is released) and a slow `execute` would defeat the
/// purpose of moving work off that path.
pub trait Executor: Send + Sync {
    /// Schedules `task` to run, returning immediately.
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// Default executor: a small fixed pool of worker threads draining a
/// shared queue, built on the same `crossbeam-channel` this crate already
/// uses for the write buffer.
pub struct ThreadPoolExecutor {
    sender: Sender<Box<dyn FnOnce() + Send>>,
    _workers: Vec<std::thread::JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    /// Spawns `worker_count` worker threads (clamped to at least 1).
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver): (_, Receiver<Box<dyn FnOnce() + Send>>) =
            crossbeam_channel::unbounded();
        let workers = (0..worker_count)
            .map(|id| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("talon-cache-worker-{id}"))
                    .spawn(move || {
                        for task in receiver.iter() {
                            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                                tracing::warn!(?panic, "talon-cache: task panicked on worker thread");
                            }
                        }
                    })
                    .expect("failed to spawn talon-cache worker thread")
            })
            .collect();
        Self {
            sender,
            _workers: workers,
        }
    }
}

impl Default for ThreadPoolExecutor {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(2);
        Self::new(parallelism.clamp(2, 8))
    }
}

impl Executor for ThreadPoolExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        if self.sender.send(task).is_err() {
            tracing::warn!("talon-cache: executor queue closed, dropping task");
        }
    }
}

/// An executor that runs tasks inline on the calling thread. Useful in
/// tests that want removal notifications to be observable synchronously,
/// and as a minimal `Executor` for single-threaded embedders.
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

pub(crate) fn default_executor() -> Arc<dyn Executor> {
    Arc::new(ThreadPoolExecutor::default())
}
