//! Telemetry metric name constants.
//!
//! Centralised metric names for the cache and RPC session. Consumers
//! install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `servingcore_`. Counters end in
//! `_total`, histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model` — `ModelId` name the entry/request belongs to
//! - `event` — RPC event tag (heartbeat, predict, metadata)

/// Total `fetch` calls, by outcome.
///
/// Labels: `outcome` ("hit" | "coalesced" | "miss").
pub const CACHE_FETCH_TOTAL: &str = "servingcore_cache_fetch_total";

/// Total entries evicted from the prediction cache.
pub const CACHE_EVICTIONS_TOTAL: &str = "servingcore_cache_evictions_total";

/// Total `put` calls rejected for exceeding the cache's size bound.
pub const CACHE_OVERSIZE_PUTS_TOTAL: &str = "servingcore_cache_oversize_puts_total";

/// Current cache occupancy in bytes.
pub const CACHE_SIZE_BYTES: &str = "servingcore_cache_size_bytes";

/// Total heartbeats sent by a container RPC session.
pub const RPC_HEARTBEATS_SENT_TOTAL: &str = "servingcore_rpc_heartbeats_sent_total";

/// Total reconnects (transport failure or activity timeout).
pub const RPC_RECONNECTS_TOTAL: &str = "servingcore_rpc_reconnects_total";

/// Total predict requests handled, by outcome.
///
/// Labels: `outcome` ("ok" | "type_mismatch" | "model_error").
pub const RPC_PREDICT_REQUESTS_TOTAL: &str = "servingcore_rpc_predict_requests_total";
