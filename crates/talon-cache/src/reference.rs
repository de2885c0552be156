//! Reference-strength wrappers for `weak_keys`/`weak_values`/`soft_values`.
//!
//! Rust has no tracing garbage collector, so there is no host hook the cache
//! can subscribe to the way a JVM-based cache polls a `ReferenceQueue`.
//! Instead, reclamation is modeled explicitly: a value stored through
//! [`WeakRef`] only stays alive as long as the caller holds another
//! [`Arc`] to it; once that external strong count drops to zero, the
//! wrapped [`std::sync::Weak`] stops upgrading and the entry is discovered
//! as reclaimed the next time the policy scans for it (see
//! [`crate::policy`]). No timer is used to simulate collection.
//!
//! `soft_values` has no separate tier in `std` and is implemented
//! identically to `weak_values` (see `DESIGN.md`).

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// A value stored by weak reference. Construct from an [`Arc`] the caller
/// retains elsewhere; [`strong`](WeakRef::strong) probes whether that
/// external reference is still alive.
#[derive(Clone)]
pub struct WeakRef<T: Send + Sync + 'static>(Weak<T>);

impl<T: Send + Sync + 'static> WeakRef<T> {
    /// Wraps a weak reference to `strong`. The cache will not itself keep
    /// `strong`'s referent alive.
    #[must_use]
    pub fn new(strong: &Arc<T>) -> Self {
        Self(Arc::downgrade(strong))
    }

    /// Attempts to upgrade to a strong reference. Returns `None` once the
    /// last external owner has dropped its `Arc<T>`.
    #[must_use]
    pub fn strong(&self) -> Option<Arc<T>> {
        self.0.upgrade()
    }
}

/// The probe used by the policy during a drain to find `WeakRef` entries
/// whose referent has been reclaimed. A concrete `fn` pointer (rather than a
/// trait bound on every cache's `V`) so ordinary strong-valued caches pay no
/// generic-bound cost for a feature they don't use.
pub(crate) fn value_is_reclaimed<T: Send + Sync + 'static>(v: &WeakRef<T>) -> bool {
    v.strong().is_none()
}

/// A key stored by weak reference, usable as a `HashMap`/`DashMap` key.
///
/// Equality switches to *identity* equality once `weak_keys()` is active:
/// two `WeakKey`s are equal only if they upgrade to the same underlying
/// allocation (`Weak::ptr_eq`), never by comparing the pointed-to values.
/// The hash is computed once at construction time (from the strong key's
/// own `Hash` impl) so it remains stable even after the referent is
/// reclaimed. A key whose referent has been reclaimed compares unequal to
/// everything, including itself, which is what makes it eligible for
/// removal rather than accidentally "found" by a stale lookup.
#[derive(Clone)]
pub struct WeakKey<K: Hash + Eq + Send + Sync + 'static> {
    hash: u64,
    inner: Weak<K>,
}

impl<K: Hash + Eq + Send + Sync + 'static> WeakKey<K> {
    /// Wraps a weak reference to `strong`, precomputing a hash from the
    /// referent's address rather than its value, so it stays consistent
    /// with identity-based [`PartialEq`].
    #[must_use]
    pub fn new(strong: &Arc<K>) -> Self {
        let mut hasher = rustc_hash::FxHasher::default();
        (Arc::as_ptr(strong) as usize).hash(&mut hasher);
        Self {
            hash: hasher.finish(),
            inner: Arc::downgrade(strong),
        }
    }

    /// Attempts to upgrade to a strong reference.
    #[must_use]
    pub fn strong(&self) -> Option<Arc<K>> {
        self.inner.upgrade()
    }
}

impl<K: Hash + Eq + Send + Sync + 'static> PartialEq for WeakKey<K> {
    fn eq(&self, other: &Self) -> bool {
        // Upgrading confirms both referents are still alive; a key whose
        // referent has been reclaimed must compare unequal to everything,
        // including another handle to the very same (now-dangling) weak
        // pointer. Identity, not the pointed-to value, decides equality.
        match (self.strong(), other.strong()) {
            (Some(_), Some(_)) => Weak::ptr_eq(&self.inner, &other.inner),
            _ => false,
        }
    }
}

impl<K: Hash + Eq + Send + Sync + 'static> Eq for WeakKey<K> {}

impl<K: Hash + Eq + Send + Sync + 'static> Hash for WeakKey<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

pub(crate) fn key_is_reclaimed<K: Hash + Eq + Send + Sync + 'static>(k: &WeakKey<K>) -> bool {
    k.strong().is_none()
}
