//! The prediction cache — a bounded, concurrent, coalescing result
//! store.
//!
//! See [`PredictionCache`] for the full contract. [`CacheValue`] is the
//! seam that lets the cache be exercised in tests with a value type
//! simpler than [`crate::types::Output`].

mod entry;
mod prediction;

pub use entry::CacheValue;
pub use prediction::{Fetch, PredictionCache};
