//! Combat: initiative order, the active turn, and overall combat status.

use serde::{Deserialize, Serialize};

use super::unit::UnitId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatStatus {
    NotStarted,
    InProgress,
    EndedVictory,
    EndedDefeat,
}

/// The state of the unit whose turn it currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    pub current_unit: UnitId,
    pub movement_remaining: u32,
    pub has_acted: bool,
}

/// Combat-wide state: a fixed initiative order (computed once at
/// `start_combat`, defeated units skipped during advancement but never
/// removed from the order), the round counter, and the active turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combat {
    pub status: CombatStatus,
    pub round: u32,
    /// Sorted by initiative descending, ties broken lexicographically by
    /// unit id, fixed for the whole combat.
    pub order: Vec<UnitId>,
    pub current_index: usize,
    pub turn: Option<TurnState>,
}

impl Combat {
    pub fn not_started() -> Self {
        Combat {
            status: CombatStatus::NotStarted,
            round: 0,
            order: Vec::new(),
            current_index: 0,
            turn: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == CombatStatus::InProgress
    }
}

/// Build the initiative order from `(unit_id, initiative)` pairs: sorted by
/// initiative descending, ties broken lexicographically by unit id
/// ascending. Stable so equal inputs always produce the same order.
pub fn build_initiative_order(mut units: Vec<(UnitId, i32)>) -> Vec<UnitId> {
    units.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    units.into_iter().map(|(id, _)| id).collect()
}
