//! `servingcore` — data plane of a low-latency model-serving platform.
//!
//! Three components, leaves first:
//!
//! - [`future`] — `wait_all`/`wait_any` combinators over a collection of
//!   asynchronous results, sharing a completion counter.
//! - [`cache`] — [`cache::PredictionCache`], a bounded, concurrent,
//!   coalescing result cache with second-chance eviction.
//! - [`rpc`] — [`rpc::Session`], the worker-side message-framed session
//!   that speaks the container RPC protocol: connect, heartbeat,
//!   metadata, predict.
//!
//! Out of scope (injected collaborators, not internal dependencies):
//! HTTP/REST ingress, the application-selection/batching policy, the
//! user model runtime, container lifecycle management, cryptographic
//! authentication of workers, durable storage, cross-process cache
//! coherence.
//!
//! # Example
//!
//! ```rust,no_run
//! use servingcore::cache::PredictionCache;
//! use servingcore::types::{CacheKey, ModelId, Output};
//!
//! let cache = PredictionCache::<Output>::new(64 * 1024 * 1024);
//! let model = ModelId::new("resnet", 1);
//! let key = CacheKey::new(&model, 42u64);
//!
//! let _fetch = cache.fetch(key);
//! cache.put(key, Output::from("yhat"));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod future;
pub mod rpc;
pub mod telemetry;
pub mod types;
mod version;

pub use error::{CoreError, Result};
pub use version::{PKG_VERSION, version_string};
