//! NPC/monster turn logic. AI-controlled units submit real actions through
//! the same `execute` path as players — there is no separate "AI state
//! update"; this module only decides *which* action to submit.

use crate::core::Position;
use crate::pathfind;

use super::action::Action;
use super::state::GameState;
use super::unit::UnitId;

/// Decide the next action for the unit whose turn is active, assuming it is
/// AI-controlled. Strategy: attack the nearest in-range, in-sight player if
/// possible; otherwise close distance toward the nearest living player;
/// otherwise end the turn.
pub fn decide_action(state: &GameState, unit_id: &UnitId) -> Action {
    let turn = match &state.combat.turn {
        Some(t) if &t.current_unit == unit_id => t,
        _ => return Action::EndTurn { unit_id: unit_id.clone() },
    };

    let unit = match state.units.get(unit_id) {
        Some(u) => u,
        None => return Action::EndTurn { unit_id: unit_id.clone() },
    };

    if !turn.has_acted {
        let targets = super::execute::valid_attack_targets(state, unit_id);
        if let Some(target) = nearest_unit(unit.position, &state.units, &targets) {
            return Action::Attack {
                unit_id: unit_id.clone(),
                target_id: target,
            };
        }
    }

    if turn.movement_remaining > 0 {
        if let Some(nearest_player) = nearest_player_position(state, unit.position) {
            let map = state.map();
            let mut blockers = state.occupied_positions();
            blockers.remove(&unit.position);

            // Try to approach: aim for a tile adjacent to the player that's
            // within budget, falling back to moving as close as reachable.
            if let Some(path) = approach_path(&map, unit.position, nearest_player, turn.movement_remaining as u64, &blockers) {
                if !path.is_empty() {
                    return Action::Move {
                        unit_id: unit_id.clone(),
                        path,
                    };
                }
            }
        }
    }

    Action::EndTurn { unit_id: unit_id.clone() }
}

fn nearest_unit(
    from: Position,
    units: &std::collections::BTreeMap<UnitId, super::unit::Unit>,
    candidates: &std::collections::BTreeSet<UnitId>,
) -> Option<UnitId> {
    candidates
        .iter()
        .filter_map(|id| units.get(id).map(|u| (id, u)))
        .min_by_key(|(id, u)| (pathfind::distance(from, u.position), (*id).clone()))
        .map(|(id, _)| id.clone())
}

fn nearest_player_position(state: &GameState, from: Position) -> Option<Position> {
    state
        .units
        .values()
        .filter(|u| u.kind == super::unit::UnitKind::Player && u.is_alive())
        .min_by_key(|u| (pathfind::distance(from, u.position), u.id.clone()))
        .map(|u| u.position)
}

/// Find the best reachable step toward `target`: the tile, among everything
/// within budget, that ends up closest (Chebyshev) to the target.
fn approach_path(
    map: &crate::map::Map,
    from: Position,
    target: Position,
    budget: u64,
    blockers: &std::collections::BTreeSet<Position>,
) -> Option<Vec<Position>> {
    let reachable = pathfind::reachable(map, from, budget, blockers);
    let best = reachable
        .into_iter()
        .min_by_key(|p| (pathfind::distance(*p, target), *p))?;

    pathfind::find_path(map, from, best, budget, blockers)
}
