//! State hashing for determinism verification.
//!
//! Deterministic hashing of game state, used for replay/conformance checks
//! and for cheaply detecting client/server drift alongside the diff engine.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes).
pub type StateHash = [u8; 32];

/// Deterministic hasher wrapping SHA-256 with typed update methods. Order of
/// updates is part of the hash's meaning — callers must update fields in a
/// fixed, documented order.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Hasher for a full `GameState` conformance hash.
    pub fn for_game_state() -> Self {
        Self::new(b"RUNE_FORGE_STATE_V1")
    }

    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.hasher.update(value.to_le_bytes());
    }

    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    #[inline]
    pub fn update_uuid(&mut self, uuid: &uuid::Uuid) {
        self.hasher.update(uuid.as_bytes());
    }

    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

pub fn hash_bytes(data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_hasher_determinism() {
        let make_hash = || {
            let mut hasher = StateHasher::for_game_state();
            hasher.update_u32(100);
            hasher.update_u64(12345);
            hasher.update_str("goblin");
            hasher.update_bool(true);
            hasher.finalize()
        };
        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn update_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };
        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn domain_separation_changes_hash() {
        let data = [1u8, 2, 3, 4];
        assert_ne!(
            hash_with_domain(b"DOMAIN_A", &data),
            hash_with_domain(b"DOMAIN_B", &data)
        );
    }
}
