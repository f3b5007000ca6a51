//! Core error types.

use std::time::Duration;

/// Error kinds surfaced by the container RPC session and the `Session`
/// start/stop guards.
///
/// Waiters never observe errors through [`crate::cache::PredictionCache`] —
/// they observe only successful outputs or wait forever (see the cache
/// module docs). An oversize put and a ring invariant violation are
/// therefore not represented here: the former is a silently-logged
/// no-op (no error value to construct), and the latter is a bug
/// indicator with no recovery path, implemented as a `panic!` at the
/// point of detection rather than a `Result` variant a caller could
/// plausibly handle.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// `Session::start` was called on an already-started session.
    ///
    /// Raised synchronously; the session already running is left
    /// untouched.
    #[error("session already started")]
    AlreadyStarted,

    /// A `PredictRequest`'s declared input type doesn't match the model's.
    ///
    /// Per-request; the session logs and continues accepting messages.
    #[error("input type mismatch: request declared {declared}, model expects {expected}")]
    InputTypeMismatch {
        declared: crate::types::InputType,
        expected: crate::types::InputType,
    },

    /// Any socket I/O or frame-decoding error.
    ///
    /// Always reconnectable: the session closes the socket and returns to
    /// `Connecting`.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// No inbound frame observed within the activity timeout while `Active`.
    #[error("no activity within {0:?}")]
    ActivityTimeout(Duration),
}

impl CoreError {
    /// Whether this error should drive the session back to `Connecting`.
    ///
    /// `AlreadyStarted` is a caller error raised synchronously and never
    /// seen by the session loop. `InputTypeMismatch` is a per-request
    /// failure that leaves the session `Active`.
    pub fn is_reconnectable(&self) -> bool {
        matches!(self, Self::TransportFailure(_) | Self::ActivityTimeout(_))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::TransportFailure(err.to_string())
    }
}

/// Result type alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, CoreError>;
