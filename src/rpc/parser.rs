//! The default `Bytes`-typed input parser.
//!
//! The core ships only this one parser, sufficient to exercise the
//! whole `PredictRequest` frame path end-to-end without pulling in a
//! tensor library; application code supplies its own `InputParser` for
//! richer input types.

use crate::types::{Input, InputParser};

/// An opaque run of bytes, hashed for the cache's input-hash fetch
/// variant.
pub struct BytesInput {
    bytes: Vec<u8>,
}

impl Input for BytesInput {
    fn hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.bytes.hash(&mut hasher);
        hasher.finish()
    }
}

/// Splits `content` into `header[1..]`-many inputs, where each header
/// value is that input's byte length. `header[0]` (the `InputType` tag)
/// has already been stripped by the session before calling
/// [`InputParser::get_inputs`].
#[derive(Default)]
pub struct BytesInputParser {
    scratch: Vec<u8>,
}

impl BytesInputParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputParser for BytesInputParser {
    fn get_data_buffer(&mut self, len: usize) -> &mut [u8] {
        if self.scratch.len() < len {
            self.scratch.resize(len.max(2 * len), 0);
        }
        &mut self.scratch[..len]
    }

    fn get_inputs(&mut self, header: &[i64], content: &[u8]) -> Vec<Box<dyn Input>> {
        let mut inputs: Vec<Box<dyn Input>> = Vec::with_capacity(header.len());
        let mut offset = 0usize;
        for &len in header {
            let len = len.max(0) as usize;
            let end = (offset + len).min(content.len());
            inputs.push(Box::new(BytesInput {
                bytes: content[offset.min(content.len())..end].to_vec(),
            }));
            offset = end;
        }
        inputs
    }
}
