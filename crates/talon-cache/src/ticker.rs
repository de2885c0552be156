//! Time source abstraction.
//!
//! The policy never reads the wall clock directly; it goes through a
//! [`Ticker`] so tests can advance time deterministically instead of
//! sleeping.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic nanosecond clock.
///
/// Ordering of events, not the absolute value, is what the policy depends
/// on; `now()` only needs to be monotonically non-decreasing for a single
/// `Ticker` instance.
pub trait Ticker: Send + Sync + fmt::Debug {
    /// Returns the current time in nanoseconds, relative to some arbitrary
    /// fixed origin (implementations need not agree on the origin).
    fn now_nanos(&self) -> u64;
}

/// Lets callers pass a shared `Arc<ManualTicker>` to
/// [`crate::builder::CacheBuilder::ticker`] and keep their own handle to
/// advance it, instead of the builder's `Arc::new` wrapping an unreachable
/// copy.
impl<T: Ticker + ?Sized> Ticker for std::sync::Arc<T> {
    fn now_nanos(&self) -> u64 {
        (**self).now_nanos()
    }
}

/// Default ticker backed by [`std::time::Instant`].
#[derive(Debug)]
pub struct SystemTicker {
    start: Instant,
}

impl SystemTicker {
    /// Creates a new ticker anchored to the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for SystemTicker {
    fn now_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// A ticker whose value is set explicitly, for deterministic tests of
/// expiration and refresh behavior.
#[derive(Debug, Default)]
pub struct ManualTicker {
    nanos: AtomicU64,
}

impl ManualTicker {
    /// Creates a manual ticker starting at `t = 0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nanos: AtomicU64::new(0),
        }
    }

    /// Advances the clock by `nanos` nanoseconds.
    pub fn advance(&self, nanos: u64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute nanosecond value.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Ticker for ManualTicker {
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
