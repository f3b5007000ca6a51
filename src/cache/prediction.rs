//! `PredictionCache` — coalescing fetch, first-writer-wins put,
//! second-chance ring eviction.
//!
//! Waiter promises are fulfilled after the lock is released, not under
//! it — holding the lock across promise completion risks a waiter's own
//! continuation trying to re-enter the cache and deadlocking.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::types::{CacheKey, Output};

use super::entry::{CacheEntry, CacheValue};

/// The future returned by [`PredictionCache::fetch`].
///
/// `Ready` for a cache hit (already completed) — polls ready
/// immediately, the first time it is polled. `Pending` for a coalesced
/// or newly-created miss — resolves once a matching [`PredictionCache::put`]
/// fulfils the underlying channel.
///
/// A caller that drops the `PredictionCache` while a `Fetch` is still
/// outstanding (no matching `put` ever arrived) sees that `Fetch` never
/// resolve — the same as an entry that is simply never completed. This
/// is consistent with "no operation fails visibly": an unresolved fetch
/// is pending forever, not a panic.
pub enum Fetch<V> {
    Ready(Option<V>),
    Pending(oneshot::Receiver<V>),
}

impl<V> Future for Fetch<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        match self.get_mut() {
            Fetch::Ready(value) => {
                Poll::Ready(value.take().expect("Fetch::Ready polled after completion"))
            }
            Fetch::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(value)) => Poll::Ready(value),
                // Sender dropped without completing (e.g. the cache itself
                // was dropped first) — treat the same as an entry that
                // never completes, rather than panicking.
                Poll::Ready(Err(_)) => Poll::Pending,
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

struct Inner<V> {
    entries: HashMap<u64, CacheEntry<V>>,
    ring: Vec<u64>,
    idx: usize,
    size_bytes: u64,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            ring: Vec::new(),
            idx: 0,
            size_bytes: 0,
        }
    }

    /// Place `key` at the ring cursor and advance it, mirroring
    /// `page_buffer_.insert(... + page_buffer_index_, key)` /
    /// `page_buffer_index_ = (page_buffer_index_ + 1) % page_buffer_.size()`.
    fn ring_insert(&mut self, key: u64) {
        let at = self.idx.min(self.ring.len());
        self.ring.insert(at, key);
        self.idx = (self.idx + 1) % self.ring.len();
    }

    /// Second-chance eviction loop. `space_needed_bytes` may be `<= 0`,
    /// in which case this is a no-op.
    fn evict(&mut self, space_needed_bytes: i64) {
        let mut space_needed = space_needed_bytes;
        while space_needed > 0 && !self.ring.is_empty() {
            let key = self.ring[self.idx];
            let entry = self.entries.get_mut(&key).unwrap_or_else(|| {
                panic!(
                    "ring invariant violated: no cache entry for key {key} at \
                     ring index {idx}",
                    idx = self.idx
                )
            });

            if !entry.completed || entry.used {
                entry.used = false;
                self.idx = (self.idx + 1) % self.ring.len();
                continue;
            }

            self.ring.remove(self.idx);
            self.idx = if self.ring.is_empty() {
                0
            } else {
                self.idx % self.ring.len()
            };
            let entry = self.entries.remove(&key).expect("checked above");
            self.size_bytes -= entry.size_bytes as u64;
            space_needed -= entry.size_bytes as i64;

            metrics::counter!(crate::telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
        }
    }
}

/// A bounded, concurrent, coalescing result cache.
///
/// Invariants:
///
/// - Exactly one entry per key at any time.
/// - `sum over completed entries of byte_size(value) == size_bytes`.
/// - `size_bytes <= max_size_bytes` except transiently inside `put`
///   before eviction runs.
/// - A pending entry (`completed == false`) is never evicted — the
///   eviction loop skips it and clears its `used` bit instead.
///
/// `V` defaults to [`crate::types::Output`]; see [`CacheValue`] for why
/// it is generic at all.
pub struct PredictionCache<V: CacheValue = Output> {
    max_size_bytes: u64,
    inner: Mutex<Inner<V>>,
}

impl<V: CacheValue> PredictionCache<V> {
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            max_size_bytes,
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Current cache occupancy in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().unwrap().size_bytes
    }

    /// Number of live entries (completed or pending).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coalescing fetch.
    ///
    /// - Hit (entry exists, completed): sets `used = true`, returns an
    ///   already-ready future carrying a copy of the value.
    /// - Coalesced miss (entry exists, pending): appends a fresh waiter,
    ///   returns its future.
    /// - Cold miss (no entry): creates a pending entry with one waiter,
    ///   inserts it into the ring, returns its future.
    pub fn fetch(&self, key: CacheKey) -> Fetch<V> {
        let raw = key.raw();
        let mut inner = self.inner.lock().unwrap();

        if let Some(entry) = inner.entries.get_mut(&raw) {
            if entry.completed {
                entry.used = true;
                let value = entry.value.clone().expect("completed entry has a value");
                metrics::counter!(crate::telemetry::CACHE_FETCH_TOTAL, "outcome" => "hit")
                    .increment(1);
                return Fetch::Ready(Some(value));
            }
            let (tx, rx) = oneshot::channel();
            entry.waiters.push(tx);
            metrics::counter!(crate::telemetry::CACHE_FETCH_TOTAL, "outcome" => "coalesced")
                .increment(1);
            return Fetch::Pending(rx);
        }

        let (tx, rx) = oneshot::channel();
        let entry = CacheEntry::pending(tx);
        // A pending entry costs 0 bytes; eviction against the
        // prospective size still runs here, though it is a no-op
        // unless the cache is already (transiently) over its bound.
        inner.evict(inner.size_bytes as i64 - self.max_size_bytes as i64);
        inner.ring_insert(raw);
        inner.entries.insert(raw, entry);
        metrics::counter!(crate::telemetry::CACHE_FETCH_TOTAL, "outcome" => "miss").increment(1);
        Fetch::Pending(rx)
    }

    /// Complete the entry for `key` with `value`.
    ///
    /// - Entry exists, pending: marks completed, accounts bytes, runs
    ///   eviction, then fulfils every waiter — *after* releasing the
    ///   lock, so a waiter's continuation can safely re-enter the cache.
    /// - Entry exists, completed: no-op (first-writer-wins).
    /// - No entry: inserts a completed entry directly (never fetched).
    ///
    /// An output whose `len_bytes()` exceeds `max_size_bytes` is
    /// rejected outright: nothing is stored, no waiter (existing or
    /// future) is fulfilled by this call, and the rejection is logged.
    /// This holds even if an entry already exists and is pending — the
    /// entry is left pending rather than completed with a value the
    /// cache cannot hold.
    pub fn put(&self, key: CacheKey, value: V) {
        let raw = key.raw();
        let value_size = value.len_bytes() as u64;

        if value_size > self.max_size_bytes {
            metrics::counter!(crate::telemetry::CACHE_OVERSIZE_PUTS_TOTAL).increment(1);
            tracing::error!(
                key = raw,
                entry_size_bytes = value_size,
                max_size_bytes = self.max_size_bytes,
                "received an output that exceeds the cache's size bound; dropping"
            );
            return;
        }

        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.get_mut(&raw) {
                Some(entry) if !entry.completed => {
                    entry.completed = true;
                    entry.value = Some(value.clone());
                    entry.size_bytes = value_size as usize;
                    let waiters = std::mem::take(&mut entry.waiters);
                    inner.size_bytes += value_size;
                    let space_needed = inner.size_bytes as i64 - self.max_size_bytes as i64;
                    inner.evict(space_needed);
                    Some(waiters)
                }
                Some(_) => None,
                None => {
                    let space_needed =
                        inner.size_bytes as i64 + value_size as i64 - self.max_size_bytes as i64;
                    inner.evict(space_needed);
                    inner.ring_insert(raw);
                    inner.size_bytes += value_size;
                    inner
                        .entries
                        .insert(raw, CacheEntry::completed(value.clone(), value_size as usize));
                    None
                }
            }
        };

        metrics::gauge!(crate::telemetry::CACHE_SIZE_BYTES).set(self.size_bytes() as f64);

        if let Some(waiters) = waiters {
            for waiter in waiters {
                let _ = waiter.send(value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelId;
    use std::sync::Arc;
    use std::thread;

    impl CacheValue for u32 {
        fn len_bytes(&self) -> usize {
            4
        }
    }

    fn key(model: &ModelId, secondary: u64) -> CacheKey {
        CacheKey::new(model, secondary)
    }

    fn noop_waker() -> std::task::Waker {
        use std::task::{RawWaker, RawWakerVTable, Waker};
        fn clone(_: *const ()) -> RawWaker {
            raw()
        }
        fn noop(_: *const ()) {}
        fn raw() -> RawWaker {
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        unsafe { Waker::from_raw(raw()) }
    }

    fn poll_ready<V>(fut: &mut Fetch<V>) -> Option<V> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match Pin::new(fut).poll(&mut cx) {
            Poll::Ready(v) => Some(v),
            Poll::Pending => None,
        }
    }

    #[test]
    fn put_then_fetch_is_already_ready() {
        let cache = PredictionCache::<u32>::new(1024);
        let model = ModelId::new("m", 1);
        let k = key(&model, 1);
        cache.put(k, 7);

        let mut fut = cache.fetch(k);
        assert_eq!(poll_ready(&mut fut), Some(7));
    }

    #[test]
    fn repeated_put_after_completion_is_a_no_op() {
        let cache = PredictionCache::<u32>::new(1024);
        let model = ModelId::new("m", 1);
        let k = key(&model, 1);
        cache.put(k, 1);
        cache.put(k, 2);

        let mut fut = cache.fetch(k);
        assert_eq!(poll_ready(&mut fut), Some(1));
    }

    #[test]
    fn size_zero_cache_rejects_every_nonzero_put_and_never_completes() {
        let cache = PredictionCache::<u32>::new(0);
        let model = ModelId::new("m", 1);
        let k = key(&model, 1);

        let mut fut = cache.fetch(k);
        cache.put(k, 7);

        assert_eq!(poll_ready(&mut fut), None, "waiter must never complete");
        assert_eq!(cache.size_bytes(), 0);
        assert_eq!(cache.len(), 1, "the pending entry itself is still tracked");
    }

    #[test]
    fn eviction_on_single_slot_ring_handles_idx_mod_zero() {
        // max_size_bytes = 4 means only one 4-byte entry fits at a time;
        // each put evicts the previous one. Exercises `idx = 0` after an
        // erase empties the ring.
        let cache = PredictionCache::<u32>::new(4);
        let model = ModelId::new("m", 1);

        cache.put(key(&model, 1), 1);
        cache.put(key(&model, 2), 2);
        cache.put(key(&model, 3), 3);

        assert_eq!(cache.size_bytes(), 4);
        assert_eq!(cache.len(), 1);

        let mut fut = cache.fetch(key(&model, 3));
        assert_eq!(poll_ready(&mut fut), Some(3));
    }

    #[test]
    fn s1_coalesced_miss_both_waiters_see_the_same_value() {
        let cache = Arc::new(PredictionCache::<u32>::new(1024));
        let model = ModelId::new("resnet", 1);
        let k = key(&model, 42);

        let mut f1 = cache.fetch(k);
        let mut f2 = cache.fetch(k);
        assert_eq!(cache.len(), 1, "coalesced fetches share one entry");

        cache.put(k, 99);

        assert_eq!(poll_ready(&mut f1), Some(99));
        assert_eq!(poll_ready(&mut f2), Some(99));
        assert_eq!(cache.size_bytes(), 4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn s2_eviction_keeps_size_bound_and_retains_the_latest_key() {
        // max=10 bytes, four 4-byte entries inserted with no interleaved
        // fetches — at least one of the first three must be evicted.
        let cache = PredictionCache::<u32>::new(10);
        let model = ModelId::new("m", 1);

        for k in 1..=4u64 {
            cache.put(key(&model, k), k as u32);
        }

        assert!(cache.size_bytes() <= 10);
        let mut fut = cache.fetch(key(&model, 4));
        assert_eq!(poll_ready(&mut fut), Some(4), "key 4 must be present");
    }

    #[test]
    fn s3_second_chance_retains_a_fetched_entry() {
        // max=12 bytes: A, B, C each 4 bytes fill it exactly. Fetching A
        // sets its used bit; inserting D must skip A (clearing used) and
        // evict B instead, leaving {A, C, D}.
        let cache = PredictionCache::<u32>::new(12);
        let model = ModelId::new("m", 1);
        let (a, b, c, d) = (
            key(&model, 1),
            key(&model, 2),
            key(&model, 3),
            key(&model, 4),
        );

        cache.put(a, 10);
        cache.put(b, 20);
        cache.put(c, 30);

        let mut fa = cache.fetch(a);
        assert_eq!(poll_ready(&mut fa), Some(10));

        cache.put(d, 40);

        assert_eq!(cache.size_bytes(), 12);
        let mut fa = cache.fetch(a);
        let mut fc = cache.fetch(c);
        let mut fd = cache.fetch(d);
        assert_eq!(poll_ready(&mut fa), Some(10));
        assert_eq!(poll_ready(&mut fc), Some(30));
        assert_eq!(poll_ready(&mut fd), Some(40));

        let mut fb = cache.fetch(b);
        // b was evicted, so this is a fresh pending entry, not the old value.
        assert_eq!(poll_ready(&mut fb), None);
    }

    #[test]
    fn ring_length_matches_entry_table_size_at_quiescence() {
        let cache = PredictionCache::<u32>::new(1024);
        let model = ModelId::new("m", 1);
        for k in 1..=5u64 {
            cache.put(key(&model, k), k as u32);
        }
        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.ring.len(), inner.entries.len());
    }

    #[test]
    fn concurrent_fetches_from_multiple_threads_coalesce() {
        let cache = Arc::new(PredictionCache::<u32>::new(1024));
        let model = Arc::new(ModelId::new("m", 1));
        let k = key(&model, 7);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let mut fut = cache.fetch(k);
                    loop {
                        if let Some(v) = poll_ready(&mut fut) {
                            return v;
                        }
                        thread::yield_now();
                    }
                })
            })
            .collect();

        // Give the threads a moment to register as waiters, then complete.
        thread::sleep(std::time::Duration::from_millis(10));
        cache.put(k, 55);

        for h in handles {
            assert_eq!(h.join().unwrap(), 55);
        }
        assert_eq!(cache.len(), 1);
    }
}
