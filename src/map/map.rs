//! The infinite, seed-derived world grid.

use serde::{Deserialize, Serialize};

use super::noise::{layered_noise, point_hash, NOISE_SCALE};
use super::tile::{Tile, TileKind};
use crate::core::Position;

/// Noise channels, kept distinct so elevation/moisture/decoration fields are
/// independent even though they share one seed.
const CHANNEL_ELEVATION: u32 = 0;
const CHANNEL_MOISTURE: u32 = 1;
const CHANNEL_DECORATION: u32 = 2;
const CHANNEL_VARIANT: u32 = 3;

/// An infinite map, identified only by its seed. No tile is ever stored —
/// `tile()` is pure and total, so the map reconstructs identically after a
/// restart or on a reconnecting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub seed: u32,
}

impl Map {
    pub fn new(seed: u32) -> Self {
        Map { seed }
    }

    pub fn tile_at(&self, pos: Position) -> Tile {
        tile(self.seed, pos.x, pos.y)
    }
}

/// Pure, total, deterministic terrain lookup.
///
/// Frozen formula: two independent two-octave noise fields (elevation,
/// moisture) classify the base terrain into bands; a high-frequency
/// decoration field then scatters obstacles on top of walkable bands, and a
/// final variant field picks among equivalent sub-kinds (grass
/// light/dark, which rock/tree).
pub fn tile(seed: u32, x: i64, y: i64) -> Tile {
    let elevation = layered_noise(seed, CHANNEL_ELEVATION, x, y);
    let moisture = layered_noise(seed, CHANNEL_MOISTURE, x, y);
    let decoration = point_hash(seed, CHANNEL_DECORATION, x, y);
    let variant = point_hash(seed, CHANNEL_VARIANT, x, y);

    // Bands over [0, NOISE_SCALE).
    let high = NOISE_SCALE * 82 / 100;
    let mid_high = NOISE_SCALE * 62 / 100;
    let mid_low = NOISE_SCALE * 30 / 100;
    let low = NOISE_SCALE * 12 / 100;

    let kind = if elevation >= high {
        pick_rock(variant)
    } else if elevation >= mid_high {
        TileKind::Pillar
    } else if elevation < low {
        TileKind::WaterDeep
    } else if elevation < mid_low {
        if moisture >= NOISE_SCALE / 2 {
            TileKind::Water
        } else {
            TileKind::Sand
        }
    } else {
        // Walkable midground: grass/dirt base, then scatter obstacles.
        let base = if moisture >= NOISE_SCALE * 55 / 100 {
            pick_grass(variant)
        } else {
            TileKind::Dirt
        };

        if base != TileKind::Dirt && decoration >= NOISE_SCALE * 90 / 100 {
            pick_tree(variant)
        } else if decoration >= NOISE_SCALE * 80 / 100 {
            TileKind::Bush
        } else {
            base
        }
    };

    Tile::new(kind)
}

fn pick_grass(variant: i64) -> TileKind {
    if variant % 2 == 0 {
        TileKind::GrassLight
    } else {
        TileKind::GrassDark
    }
}

fn pick_rock(variant: i64) -> TileKind {
    match variant % 5 {
        0 => TileKind::Rock1,
        1 => TileKind::Rock2,
        2 => TileKind::Rock3,
        3 => TileKind::Rock4,
        _ => TileKind::Rock5,
    }
}

fn pick_tree(variant: i64) -> TileKind {
    match variant % 5 {
        0 => TileKind::Tree1,
        1 => TileKind::Tree2,
        2 => TileKind::Tree3,
        3 => TileKind::Tree4,
        _ => TileKind::Tree5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_is_pure_and_total() {
        for _ in 0..3 {
            assert_eq!(tile(99, 5, -5).kind, tile(99, 5, -5).kind);
        }
        // A distant coordinate must still resolve without panicking.
        let _ = tile(99, 1_000_000, -1_000_000);
    }

    #[test]
    fn map_reconstructs_identically_from_seed() {
        let a = Map::new(42);
        let b = Map::new(42);
        for x in -5..5 {
            for y in -5..5 {
                assert_eq!(
                    a.tile_at(Position::new(x, y)).kind,
                    b.tile_at(Position::new(x, y)).kind
                );
            }
        }
    }

    /// Conformance vector: twenty `(seed, x, y) -> kind` triples pinned
    /// against the frozen noise formula. A change to `tile()`, `value_noise`,
    /// or `hash_lattice` that alters any one of these twenty kinds breaks
    /// reconstruction-from-seed interop between already-deployed clients and
    /// servers, and must be a deliberate, reviewed re-recording of this
    /// vector rather than an accidental drift.
    #[test]
    fn conformance_vector_matches_pinned_kinds() {
        const CASES: &[(u32, i64, i64, TileKind)] = &[
            (7, 0, 0, TileKind::Dirt),
            (7, 16, 0, TileKind::Water),
            (7, -16, 0, TileKind::Rock3),
            (7, 0, 16, TileKind::Rock5),
            (7, 0, -16, TileKind::Water),
            (7, 400, -120, TileKind::GrassLight),
            (7, -400, 120, TileKind::GrassDark),
            (42, 0, 0, TileKind::Water),
            (42, 64, 64, TileKind::Sand),
            (42, -64, -64, TileKind::GrassLight),
            (42, 200, -200, TileKind::Pillar),
            (42, -200, 200, TileKind::GrassDark),
            (123, 8, -8, TileKind::Rock5),
            (123, -8, 8, TileKind::Dirt),
            (123, 1000, 1000, TileKind::Dirt),
            (123, -1000, -1000, TileKind::Water),
            (99, -99, 7, TileKind::Water),
            (99, -99, 8, TileKind::Water),
            (9999, 500, -500, TileKind::Dirt),
            (9999, -500, 500, TileKind::Bush),
        ];
        assert_eq!(CASES.len(), 20);

        for &(seed, x, y, expected) in CASES {
            assert_eq!(tile(seed, x, y).kind, expected, "seed={seed} x={x} y={y}");
        }
    }
}
