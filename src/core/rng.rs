//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ for fast, high-quality, deterministic randomness. Given
//! the same seed, it produces an identical sequence on every platform — the
//! simulation core relies on this to keep replays and server/session state
//! reproducible.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// # Determinism guarantee
///
/// Given the same seed, this RNG produces the exact same sequence of random
/// numbers on any platform.
///
/// ```
/// use rune_forge::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(42);
/// assert_eq!(rng.next_u64(), 16629283624882167704);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed, via SplitMix64 expansion so weak
    /// seeds still produce well-distributed initial state.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Derive the per-action RNG used by `execute`, keyed on the session's
    /// world seed and the action's sequence number so replays and
    /// resimulation never drift.
    pub fn for_action(session_seed: u32, action_sequence: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"RUNE_FORGE_ACTION_SEED_V1");
        hasher.update(session_seed.to_le_bytes());
        hasher.update(action_sequence.to_le_bytes());
        let hash = hasher.finalize();
        let seed = u64::from_le_bytes(hash[0..8].try_into().unwrap());
        Self::new(seed)
    }

    /// Next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    /// Random integer in `[0, max)` via modulo (slight bias for very large
    /// `max`, acceptable for gameplay rolls).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as u32
    }

    /// Random integer in `[min, max]`.
    #[inline]
    pub fn next_int_range(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        let range = (max - min + 1) as u64;
        min + (self.next_u64() % range) as i64
    }

    /// Random `true` with the given probability in `[0.0, 1.0]`.
    #[inline]
    pub fn next_bool(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        let roll = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        roll < probability
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Pick a random element.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            Some(&slice[idx])
        }
    }

    /// Weighted pick over `(weight, value)` pairs; weights need not sum to
    /// any particular total. Returns `None` for an empty or all-zero table.
    pub fn weighted_choice<'a, T>(&mut self, table: &'a [(u32, T)]) -> Option<&'a T> {
        let total: u32 = table.iter().map(|(w, _)| *w).sum();
        if total == 0 {
            return None;
        }
        let mut roll = self.next_int(total);
        for (weight, value) in table {
            if roll < *weight {
                return Some(value);
            }
            roll -= weight;
        }
        table.last().map(|(_, v)| v)
    }

    /// Current internal state, for checkpointing as part of Game State.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64, used only to expand a seed into well-distributed initial
/// Xorshift128+ state.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed() {
        let mut a = DeterministicRng::new(12345);
        let mut b = DeterministicRng::new(12345);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = DeterministicRng::new(12345);
        let mut b = DeterministicRng::new(54321);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn known_regression_values() {
        let mut rng = DeterministicRng::new(42);
        assert_eq!(rng.next_u64(), 16629283624882167704);
        assert_eq!(rng.next_u64(), 1420492921613871959);
        assert_eq!(rng.next_u64(), 9768315062676884790);
    }

    #[test]
    fn next_int_bounds() {
        let mut rng = DeterministicRng::new(1234);
        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
        }
        assert_eq!(rng.next_int(0), 0);
    }

    #[test]
    fn for_action_is_deterministic_and_sequence_sensitive() {
        let mut a = DeterministicRng::for_action(7, 3);
        let mut b = DeterministicRng::for_action(7, 3);
        assert_eq!(a.next_u64(), b.next_u64());

        let mut c = DeterministicRng::for_action(7, 4);
        assert_ne!(a.next_u64(), c.next_u64());
    }

    #[test]
    fn weighted_choice_respects_zero_weight() {
        let mut rng = DeterministicRng::new(99);
        let table = [(0u32, "never"), (1, "always")];
        for _ in 0..50 {
            assert_eq!(rng.weighted_choice(&table), Some(&"always"));
        }
    }

    #[test]
    fn shuffle_is_deterministic() {
        let mut a = DeterministicRng::new(1111);
        let mut b = DeterministicRng::new(1111);
        let mut arr1 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut arr2 = arr1;
        a.shuffle(&mut arr1);
        b.shuffle(&mut arr2);
        assert_eq!(arr1, arr2);
    }
}
