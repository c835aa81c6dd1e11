//! Line-of-sight via Bresenham ray casting.

use crate::core::Position;
use crate::map::Map;

/// Whether an unobstructed line exists between `a` and `b`.
///
/// Traces the Bresenham line between the two tiles; any tile along the way
/// that `blocks_los` fails the check. The two endpoints themselves are
/// exempt, so a unit standing next to an obstacle still sees past its own
/// and the target's tile. Never cached — the caller re-derives it fresh
/// every time it's needed, since occupants and (in principle) the tiles
/// between two points can matter differently turn to turn.
pub fn has_los(map: &Map, a: Position, b: Position) -> bool {
    for p in bresenham_line(a, b) {
        if p == a || p == b {
            continue;
        }
        if map.tile_at(p).blocks_los() {
            return false;
        }
    }
    true
}

/// Chebyshev distance between two positions.
pub fn distance(a: Position, b: Position) -> u64 {
    a.distance(&b)
}

/// Whether two positions are adjacent (distance <= 1, and distinct).
pub fn is_adjacent(a: Position, b: Position) -> bool {
    a.is_adjacent(&b)
}

/// Bresenham's line algorithm over integer grid coordinates, inclusive of
/// both endpoints.
fn bresenham_line(a: Position, b: Position) -> Vec<Position> {
    let mut points = Vec::new();

    let (mut x0, mut y0) = (a.x, a.y);
    let (x1, y1) = (b.x, b.y);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        points.push(Position::new(x0, y0));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }

    points
}
