//! Grid & Map: an infinite, deterministic tile world reconstructed purely
//! from a seed. No tile is ever persisted.

mod map;
mod noise;
mod tile;

pub use map::{tile as tile_at_seed, Map};
pub use tile::{Tile, TileKind};
