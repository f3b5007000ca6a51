//! Prediction output — a value-copyable carrier of raw response bytes.

/// Raw model output bytes, plus a byte-length accessor used for cache
/// accounting.
///
/// `Output` is value-copyable: the cache stores a copy per entry, and
/// every completed waiter receives its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    bytes: Vec<u8>,
}

impl Output {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte size used for [`crate::cache::PredictionCache`] accounting.
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl From<Vec<u8>> for Output {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for Output {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}
