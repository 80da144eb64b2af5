//! Key generation for documents created without a key.

use std::fmt::{self, Debug};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::document::Value;

/// Produces unique string keys (random UUIDs) from an injected random source.
///
/// Tests construct it with [`KeyGenerator::seeded`] to get a repeatable key
/// sequence.
pub struct KeyGenerator {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator").finish_non_exhaustive()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }
}

impl KeyGenerator {
    /// A generator seeded from the operating system.
    pub fn new() -> Self {
        Self::default()
    }

    /// A deterministic generator: equal seeds yield equal key sequences.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// A new version-4 UUID string.
    pub fn unique_string(&self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.lock().fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
    }

    /// A new key value.
    pub fn new_key(&self) -> Value {
        Value::String(self.unique_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_sequences_repeat() {
        let a = KeyGenerator::seeded(42);
        let b = KeyGenerator::seeded(42);
        let first: Vec<String> = (0..3).map(|_| a.unique_string()).collect();
        let second: Vec<String> = (0..3).map(|_| b.unique_string()).collect();
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn test_keys_are_v4_uuids() {
        let key = KeyGenerator::new().unique_string();
        let parsed = uuid::Uuid::parse_str(&key).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_different_seeds_differ() {
        assert_ne!(
            KeyGenerator::seeded(1).unique_string(),
            KeyGenerator::seeded(2).unique_string()
        );
    }
}
