//! The `Model` seam — application code's prediction entry point.

use crate::types::InputType;
use crate::types::Input;

/// A deployed model, as the session needs to see it.
///
/// `predict` returns a `Result` so the session can map a failing
/// invocation to a zero-output response without relying on unwinding.
pub trait Model: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn version(&self) -> u32;
    fn input_type(&self) -> InputType;

    /// Run inference. `Err` is converted by the session into a
    /// zero-output response (`num_outputs = 0`); the error message is
    /// logged but not placed on the wire.
    fn predict(&self, inputs: Vec<Box<dyn Input>>) -> Result<Vec<String>, String>;
}
