//! Model identity, input-type tags, and opaque query identifiers.

use std::fmt;
use std::hash::{Hash, Hasher};

/// `(name, version)` pair identifying a deployed model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId {
    pub name: String,
    pub version: u32,
}

impl ModelId {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Stable hash used as the primary component of a [`crate::types::CacheKey`].
    pub fn hash_id(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Element kind of a prediction input batch.
///
/// The wire tag (`input_header[0]` in a `PredictRequest` frame) is the
/// enum's ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum InputType {
    Bytes = 0,
    Ints = 1,
    Floats = 2,
    Doubles = 3,
    Strings = 4,
}

impl InputType {
    /// Decode a wire tag. Unknown tags are rejected at the call site
    /// (session treats them the same as a type mismatch) rather than
    /// panicking here.
    pub fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            0 => Some(Self::Bytes),
            1 => Some(Self::Ints),
            2 => Some(Self::Floats),
            3 => Some(Self::Doubles),
            4 => Some(Self::Strings),
            _ => None,
        }
    }

    pub fn tag(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bytes => "bytes",
            Self::Ints => "ints",
            Self::Floats => "floats",
            Self::Doubles => "doubles",
            Self::Strings => "strings",
        };
        f.write_str(name)
    }
}

/// Opaque caller-supplied identifier used as a cache secondary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
