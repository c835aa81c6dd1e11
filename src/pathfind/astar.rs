//! A* pathfinding and flood-fill reachability over the tile grid.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::core::Position;
use crate::map::Map;

/// Returns `true` if `pos` may be entered: walkable per the map, and not
/// occupied by a blocker (another unit).
fn is_open(map: &Map, blockers: &BTreeSet<Position>, pos: Position) -> bool {
    map.tile_at(pos).walkable() && !blockers.contains(&pos)
}

#[derive(Clone, Copy, Eq, PartialEq)]
struct Frontier {
    cost: u64,
    estimate: u64,
    position: Position,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is max-heap; reverse by estimate so the lowest
        // estimated total cost pops first. Break ties by position so the
        // traversal order (and hence the path chosen) is deterministic.
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find the shortest 4-connected, unit-cost path from `from` to `to`,
/// subject to a movement budget and a set of blocked tiles (other units).
///
/// Returns `None` if `to` is unreachable within `budget` steps. Ties in the
/// frontier are broken deterministically (see `Frontier::cmp`), and among
/// equal-cost neighbor expansions the `+x` then `+y` order from
/// `Position::neighbors4` is preferred, so the same inputs always yield the
/// same path.
pub fn find_path(
    map: &Map,
    from: Position,
    to: Position,
    budget: u64,
    blockers: &BTreeSet<Position>,
) -> Option<Vec<Position>> {
    if from == to {
        return Some(Vec::new());
    }
    if !is_open(map, blockers, to) {
        return None;
    }

    let mut open = BinaryHeap::new();
    let mut best_cost: BTreeMap<Position, u64> = BTreeMap::new();
    let mut came_from: BTreeMap<Position, Position> = BTreeMap::new();

    best_cost.insert(from, 0);
    open.push(Frontier {
        cost: 0,
        estimate: from.manhattan(&to),
        position: from,
    });

    while let Some(current) = open.pop() {
        if current.position == to {
            return Some(reconstruct_path(&came_from, from, to));
        }

        let known_cost = match best_cost.get(&current.position) {
            Some(c) if *c == current.cost => *c,
            _ => continue, // stale heap entry
        };

        if known_cost >= budget {
            continue;
        }

        for neighbor in current.position.neighbors4() {
            if neighbor != to && !is_open(map, blockers, neighbor) {
                continue;
            }
            let tentative = known_cost + 1;
            if tentative > budget {
                continue;
            }
            let better = match best_cost.get(&neighbor) {
                Some(existing) => tentative < *existing,
                None => true,
            };
            if better {
                best_cost.insert(neighbor, tentative);
                came_from.insert(neighbor, current.position);
                open.push(Frontier {
                    cost: tentative,
                    estimate: tentative + neighbor.manhattan(&to),
                    position: neighbor,
                });
            }
        }
    }

    None
}

fn reconstruct_path(
    came_from: &BTreeMap<Position, Position>,
    from: Position,
    to: Position,
) -> Vec<Position> {
    let mut path = vec![to];
    let mut current = to;
    while current != from {
        current = came_from[&current];
        if current != from {
            path.push(current);
        }
    }
    path.reverse();
    path
}

/// Flood-fill every tile reachable from `from` within `budget` steps,
/// respecting blockers. `from` itself is not included.
pub fn reachable(
    map: &Map,
    from: Position,
    budget: u64,
    blockers: &BTreeSet<Position>,
) -> BTreeSet<Position> {
    let mut visited: BTreeMap<Position, u64> = BTreeMap::new();
    visited.insert(from, 0);
    let mut frontier = vec![from];

    for _ in 0..budget {
        let mut next_frontier = Vec::new();
        for pos in frontier {
            let cost = visited[&pos];
            for neighbor in pos.neighbors4() {
                if !is_open(map, blockers, neighbor) {
                    continue;
                }
                let tentative = cost + 1;
                let better = match visited.get(&neighbor) {
                    Some(existing) => tentative < *existing,
                    None => true,
                };
                if better {
                    visited.insert(neighbor, tentative);
                    next_frontier.push(neighbor);
                }
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }

    visited.into_keys().filter(|p| *p != from).collect()
}
