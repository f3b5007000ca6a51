//! Core data model: model identity, inputs, outputs, and cache keys.
//!
//! See [`crate::cache`] for how [`CacheKey`] is constructed and
//! [`crate::rpc`] for how [`InputType`] and the [`Input`]/[`InputParser`]
//! traits surface on the wire.

mod input;
mod key;
mod model;
mod output;

pub use input::{Input, InputParser};
pub use key::CacheKey;
pub use model::{InputType, ModelId, QueryId};
pub use output::Output;
