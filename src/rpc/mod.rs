//! The container RPC session — the worker side of a message-framed
//! protocol for talking to a central model-serving process: connect,
//! heartbeat, container metadata, predict.
//!
//! See [`Session`] for the state machine and [`Model`]/[`crate::types::InputParser`]
//! for the seams application code plugs into.

mod events;
mod model;
mod parser;
mod session;
mod wire;

pub use events::{EventHistory, RpcEvent, DEFAULT_EVENT_HISTORY_CAPACITY};
pub use model::Model;
pub use parser::{BytesInput, BytesInputParser};
pub use session::{Session, SessionConfig, SessionState};
