//! Core deterministic primitives shared by the simulation and session layers.

pub mod hash;
pub mod position;
pub mod rng;

pub use hash::{StateHash, StateHasher};
pub use position::Position;
pub use rng::DeterministicRng;
