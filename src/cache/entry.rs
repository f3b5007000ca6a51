//! Cache entry and the `CacheValue` seam.

use tokio::sync::oneshot;

/// A value a [`super::PredictionCache`] can store.
///
/// Implemented for [`crate::types::Output`] (the cache's only real
/// instantiation); the trait exists so the cache's concurrency and
/// eviction behavior can be exercised in tests against a trivial value
/// type, without dragging `Output`'s byte-buffer semantics into every
/// assertion.
pub trait CacheValue: Clone + Send + 'static {
    /// Byte size charged against the cache's size bound.
    fn len_bytes(&self) -> usize;
}

impl CacheValue for crate::types::Output {
    fn len_bytes(&self) -> usize {
        crate::types::Output::len_bytes(self)
    }
}

/// One cache slot.
///
/// Invariants, enforced by [`super::PredictionCache`]:
/// - `completed == false` ⇒ `waiters` may be non-empty and `value` is
///   `None`.
/// - `completed == true` ⇒ `waiters` is empty.
/// - `size_bytes` is `0` while pending, and the true byte size of
///   `value` once completed — eviction accounting reads this field
///   rather than re-deriving it from `value`.
pub(super) struct CacheEntry<V> {
    pub completed: bool,
    pub value: Option<V>,
    pub waiters: Vec<oneshot::Sender<V>>,
    /// Second-chance bit: set on every hit, cleared (not evicted) the
    /// first time the eviction loop's cursor passes over it.
    pub used: bool,
    pub size_bytes: usize,
}

impl<V> CacheEntry<V> {
    pub fn pending(waiter: oneshot::Sender<V>) -> Self {
        Self {
            completed: false,
            value: None,
            waiters: vec![waiter],
            used: false,
            size_bytes: 0,
        }
    }

    pub fn completed(value: V, size_bytes: usize) -> Self {
        Self {
            completed: true,
            value: Some(value),
            waiters: Vec::new(),
            used: false,
            size_bytes,
        }
    }
}
