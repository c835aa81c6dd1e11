//! Integer grid coordinates.
//!
//! Rune Forge's world is an infinite discrete tile grid, not a continuous
//! plane, so positions are plain `i64` pairs rather than fixed-point reals.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A tile coordinate on the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub fn new(x: i64, y: i64) -> Self {
        Position { x, y }
    }

    /// Chebyshev distance: `max(|dx|, |dy|)`.
    pub fn distance(&self, other: &Position) -> u64 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    /// Manhattan distance, used as the A* heuristic (admissible under
    /// 4-connected unit-cost movement).
    pub fn manhattan(&self, other: &Position) -> u64 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx + dy
    }

    pub fn is_adjacent(&self, other: &Position) -> bool {
        self != other && self.distance(other) <= 1
    }

    /// 4-connected neighbors in a fixed deterministic order: +x, -x, +y, -y.
    /// Ties in pathfinding prefer +x then +y, so this order matters.
    pub fn neighbors4(&self) -> [Position; 4] {
        [
            Position::new(self.x + 1, self.y),
            Position::new(self.x - 1, self.y),
            Position::new(self.x, self.y + 1),
            Position::new(self.x, self.y - 1),
        ]
    }
}

impl Add for Position {
    type Output = Position;
    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;
    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_chebyshev() {
        assert_eq!(Position::new(0, 0).distance(&Position::new(3, 1)), 3);
        assert_eq!(Position::new(0, 0).distance(&Position::new(1, 4)), 4);
    }

    #[test]
    fn adjacency_excludes_self() {
        let p = Position::new(5, 5);
        assert!(!p.is_adjacent(&p));
        assert!(p.is_adjacent(&Position::new(6, 6)));
        assert!(!p.is_adjacent(&Position::new(7, 5)));
    }

    #[test]
    fn neighbor_order_is_fixed() {
        let p = Position::new(2, 2);
        let n = p.neighbors4();
        assert_eq!(n[0], Position::new(3, 2));
        assert_eq!(n[1], Position::new(1, 2));
        assert_eq!(n[2], Position::new(2, 3));
        assert_eq!(n[3], Position::new(2, 1));
    }
}
