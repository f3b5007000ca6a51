//! Cache key construction.

use std::hash::{Hash, Hasher};

use super::ModelId;

/// `u64 = combine(hash(ModelId), secondary)`.
///
/// `secondary` is either an input hash or a [`super::QueryId`], depending
/// on which [`crate::cache::PredictionCache`] variant is in use; a single
/// cache instance uses one variant.
///
/// # Collision hazard
///
/// `CacheKey` stores only the combined `u64`, not the source
/// `(ModelId, secondary)` pair — the cache does not probe on collision.
/// Two distinct keys that hash to the same `u64` share one entry; this
/// is a documented correctness hazard of the design, not a bug. A
/// caller that cannot tolerate the hazard must hash a wider key space
/// or compare full keys itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(model: &ModelId, secondary: impl Hash) -> Self {
        let model_hash = model.hash_id();
        let secondary_hash = {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            secondary.hash(&mut hasher);
            hasher.finish()
        };
        Self(mix(mix(0, model_hash), secondary_hash))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Non-commutative mixer: `seed ^= h + 0x9e3779b9 + (seed << 6) + (seed >> 2)`,
/// applied once per combined component.
fn mix(seed: u64, h: u64) -> u64 {
    seed ^ (h
        .wrapping_add(0x9e3779b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_key() {
        let m = ModelId::new("resnet", 1);
        let a = CacheKey::new(&m, 42u64);
        let b = CacheKey::new(&m, 42u64);
        assert_eq!(a, b);
    }

    #[test]
    fn different_secondary_differs() {
        let m = ModelId::new("resnet", 1);
        let a = CacheKey::new(&m, 42u64);
        let b = CacheKey::new(&m, 43u64);
        assert_ne!(a, b);
    }

    #[test]
    fn different_model_differs() {
        let a = CacheKey::new(&ModelId::new("resnet", 1), 42u64);
        let b = CacheKey::new(&ModelId::new("resnet", 2), 42u64);
        assert_ne!(a, b);
    }

    #[test]
    fn mixer_is_non_commutative() {
        // combine(a, b) != combine(b, a) in general — the mixer is order
        // sensitive.
        assert_ne!(mix(mix(0, 1), 2), mix(mix(0, 2), 1));
    }
}
