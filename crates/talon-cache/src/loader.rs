//! The loader contract for `get_with` and refresh.

use crate::error::Error;
use std::collections::HashMap;

/// Computes values for keys absent from the cache.
///
/// Implement `load_all` when a bulk round-trip (e.g. one database query for
/// N keys) is materially cheaper than N individual `load` calls; the
/// default falls back to single-key loads. Implement `reload` to give
/// `refresh_after_write` access to the prior value (e.g. to send an
/// `If-Modified-Since`-style conditional request); the default just calls
/// `load` again and ignores the old value.
pub trait Loader<K, V>: Send + Sync {
    /// Computes the value for `key`. A single-flight cohort of concurrent
    /// `get_with` callers for the same missing key invokes this at most
    /// once; the result is shared with every waiter.
    fn load(&self, key: &K) -> Result<V, Error>;

    /// Computes values for multiple keys at once. Returning `None` (the
    /// default) tells the cache to fall back to individual `load` calls.
    /// A returned map that omits requested keys causes those keys to be
    /// treated as load failures; extraneous keys are accepted but only the
    /// requested ones are installed.
    fn load_all(&self, keys: &[K]) -> Option<Result<HashMap<K, V>, Error>>
    where
        K: Clone + Eq + std::hash::Hash,
    {
        let _ = keys;
        None
    }

    /// Recomputes the value for a key already in the cache, for
    /// `refresh_after_write`. Returning `Ok(None)` removes the entry;
    /// returning `Err` leaves the prior value in place (see `DESIGN.md`
    /// for why a transient refresh failure does not evict).
    fn reload(&self, key: &K, old_value: &V) -> Result<Option<V>, Error> {
        let _ = old_value;
        self.load(key).map(Some)
    }
}

/// Adapts a plain closure into a [`Loader`] for the common case where only
/// `load` is needed.
pub struct FnLoader<F>(pub F);

impl<K, V, F> Loader<K, V> for FnLoader<F>
where
    F: Fn(&K) -> Result<V, Error> + Send + Sync,
{
    fn load(&self, key: &K) -> Result<V, Error> {
        (self.0)(key)
    }
}
