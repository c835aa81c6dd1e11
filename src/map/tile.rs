//! Tile kinds and their derived movement/vision properties.

use serde::{Deserialize, Serialize};

/// The kind of terrain occupying a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Floor,
    GrassLight,
    GrassDark,
    Dirt,
    Sand,
    Water,
    WaterDeep,
    Wall,
    Pillar,
    Rock1,
    Rock2,
    Rock3,
    Rock4,
    Rock5,
    Tree1,
    Tree2,
    Tree3,
    Tree4,
    Tree5,
    Bush,
}

impl TileKind {
    /// Whether a unit may occupy or path through this tile.
    ///
    /// Bushes are walkable (units can push through undergrowth); deep water,
    /// rock, tree trunks, walls and pillars are not.
    pub fn walkable(&self) -> bool {
        !matches!(
            self,
            TileKind::WaterDeep
                | TileKind::Wall
                | TileKind::Pillar
                | TileKind::Rock1
                | TileKind::Rock2
                | TileKind::Rock3
                | TileKind::Rock4
                | TileKind::Rock5
                | TileKind::Tree1
                | TileKind::Tree2
                | TileKind::Tree3
                | TileKind::Tree4
                | TileKind::Tree5
        )
    }

    /// Whether this tile blocks a line-of-sight ray passing through it.
    ///
    /// Bushes block sight despite being walkable — the one tile where the
    /// two properties diverge.
    pub fn blocks_los(&self) -> bool {
        matches!(
            self,
            TileKind::Wall
                | TileKind::Pillar
                | TileKind::Rock1
                | TileKind::Rock2
                | TileKind::Rock3
                | TileKind::Rock4
                | TileKind::Rock5
                | TileKind::Tree1
                | TileKind::Tree2
                | TileKind::Tree3
                | TileKind::Tree4
                | TileKind::Tree5
                | TileKind::Bush
        )
    }
}

/// A single grid cell, fully derived from its `TileKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub kind: TileKind,
}

impl Tile {
    pub fn new(kind: TileKind) -> Self {
        Tile { kind }
    }

    pub fn walkable(&self) -> bool {
        self.kind.walkable()
    }

    pub fn blocks_los(&self) -> bool {
        self.kind.blocks_los()
    }
}
