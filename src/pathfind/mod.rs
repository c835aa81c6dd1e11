//! Pathfinding & line-of-sight, operating over the grid under a caller-given
//! movement budget. Never caches results across calls or turns.

mod astar;
mod los;

pub use astar::{find_path, reachable};
pub use los::{distance, has_los, is_adjacent};
