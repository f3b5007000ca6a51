//! Future composition — `wait_all` / `wait_any` over a collection of
//! async results, driven by a shared, atomically-updated completion
//! counter.
//!
//! The completion counter is `Arc`-owned by every wrapper and the
//! caller, so the storage cannot be dropped while a wrapper still holds
//! it; a use-after-free hazard from a raw reference into a completion
//! counter that outlives its storage is expressed away in the type,
//! not left as a contract the caller must remember.
//!
//! [`crate::cache::PredictionCache`]'s fan-out to waiters is built on
//! top of these combinators when a caller fetches several keys
//! concurrently and wants either all of them (ensemble) or the first to
//! arrive (shortest-response-wins).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// A boxed, pinned, send future — the common representation for wrapped
/// inputs, since `wait_all`/`wait_any` are generic over heterogeneous
/// call sites.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Fulfils exactly once. Dropping the sender half without fulfilling
/// (e.g. on an empty input) resolves the receiver with `RecvError`,
/// which callers should treat the same as "already complete" — nothing
/// was waiting.
pub type DoneSignal = oneshot::Receiver<()>;

/// Shared ownership of the completion counter every wrapper co-owns.
///
/// The counter's storage is released only when every wrapper (and the
/// caller's own clone, if kept) has been dropped.
pub type SharedCounter = Arc<AtomicUsize>;

/// A fresh zero-initialized counter for a new `wait_all`/`wait_any` call.
pub fn counter() -> SharedCounter {
    Arc::new(AtomicUsize::new(0))
}

/// Wrap `futures` so that `done_signal` fulfils once every one of them
/// has completed.
///
/// Each wrapper increments `counter` on its own completion and checks
/// whether it was the last (`counter == N` after the increment); that
/// wrapper fulfils `done_signal`. The wrapped futures preserve 1-to-1
/// correspondence with the inputs and complete with the same values at
/// the same points as the inputs they wrap.
///
/// Empty input yields an already-fulfilled `done_signal` and an empty
/// wrapped list.
pub fn wait_all<F, T>(futures: Vec<F>, counter: SharedCounter) -> (DoneSignal, Vec<BoxFuture<T>>)
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    if futures.is_empty() {
        let _ = tx.send(());
        return (rx, Vec::new());
    }

    let total = futures.len();
    let done_tx = Arc::new(Mutex::new(Some(tx)));

    let wrapped = futures
        .into_iter()
        .map(|fut| {
            let counter = counter.clone();
            let done_tx = done_tx.clone();
            let boxed: BoxFuture<T> = Box::pin(async move {
                let value = fut.await;
                let completed = counter.fetch_add(1, Ordering::AcqRel) + 1;
                if completed == total {
                    if let Some(tx) = done_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }
                value
            });
            boxed
        })
        .collect();

    (rx, wrapped)
}

/// Wrap `futures` so that `done_signal` fulfils on the *first*
/// completion, observed via `fetch_add` returning `0`.
///
/// Subsequent completions still flow through their own wrappers and
/// resolve with their values — cancellation of `done_signal` does not
/// cancel the inputs — but only the first touches `done_signal`.
pub fn wait_any<F, T>(futures: Vec<F>, counter: SharedCounter) -> (DoneSignal, Vec<BoxFuture<T>>)
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    if futures.is_empty() {
        let _ = tx.send(());
        return (rx, Vec::new());
    }

    let done_tx = Arc::new(Mutex::new(Some(tx)));

    let wrapped = futures
        .into_iter()
        .map(|fut| {
            let counter = counter.clone();
            let done_tx = done_tx.clone();
            let boxed: BoxFuture<T> = Box::pin(async move {
                let value = fut.await;
                let was_first = counter.fetch_add(1, Ordering::AcqRel) == 0;
                if was_first {
                    if let Some(tx) = done_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }
                value
            });
            boxed
        })
        .collect();

    (rx, wrapped)
}
