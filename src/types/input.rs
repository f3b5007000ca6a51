//! `Input` and `InputParser` — the seam at which callers plug in their
//! own tensor/record parsing.
//!
//! The core only receives parsed inputs and raw output bytes — it
//! never inspects input content itself beyond `hash()`, used by the
//! cache's input-hash fetch variant.

/// Opaque prediction input.
///
/// The core never looks inside an `Input`; it only needs a stable hash
/// for the cache's input-hash fetch variant.
pub trait Input: Send + Sync {
    /// Stable hash of this input's content, used as a `CacheKey`
    /// secondary component. Two inputs that should coalesce to the same
    /// cache entry must hash equal.
    fn hash(&self) -> u64;
}

/// Parses a `PredictRequest`'s header/content frames into `Input`s.
///
/// Implemented by application code; the core ships only the trait and
/// [`crate::rpc::BytesInputParser`], a parser for the `Bytes` input
/// type sufficient to exercise the frame path end-to-end.
pub trait InputParser: Send {
    /// Return a growable scratch buffer of at least `len` bytes for the
    /// session to read the request's `content` frame into.
    ///
    /// Implementations may reuse a buffer across calls; the session
    /// only requires the returned slice be at least `len` bytes.
    fn get_data_buffer(&mut self, len: usize) -> &mut [u8];

    /// Parse the declared inputs out of `header` (the decoded
    /// `input_header` frame, tag already stripped) and `content`
    /// (exactly `content_size_bytes` long, as filled by
    /// [`InputParser::get_data_buffer`]).
    fn get_inputs(&mut self, header: &[i64], content: &[u8]) -> Vec<Box<dyn Input>>;
}
