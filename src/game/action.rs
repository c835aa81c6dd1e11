//! Actions a unit can submit, and why `execute` might reject one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Position;

use super::loot::LootId;
use super::unit::UnitId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Move { unit_id: UnitId, path: Vec<Position> },
    Attack { unit_id: UnitId, target_id: UnitId },
    CollectLoot { unit_id: UnitId, loot_id: LootId },
    EndTurn { unit_id: UnitId },
}

impl Action {
    pub fn unit_id(&self) -> &UnitId {
        match self {
            Action::Move { unit_id, .. } => unit_id,
            Action::Attack { unit_id, .. } => unit_id,
            Action::CollectLoot { unit_id, .. } => unit_id,
            Action::EndTurn { unit_id } => unit_id,
        }
    }
}

/// Stable error codes surfaced verbatim in `action-result`/`error` wire
/// messages. Every variant here is a state-precondition failure — rejected
/// actions never mutate `GameState` or advance its version.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ExecuteError {
    #[error("combat has not started")]
    CombatNotInProgress,
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
    #[error("unknown loot drop {0}")]
    UnknownLoot(LootId),
    #[error("it is not this unit's turn")]
    NotYourTurn,
    #[error("this unit has already acted this turn")]
    AlreadyActed,
    #[error("insufficient movement remaining")]
    InsufficientMovement,
    #[error("path is blocked or not walkable")]
    TileBlocked,
    #[error("target is out of range")]
    OutOfRange,
    #[error("no line of sight to target")]
    NoLineOfSight,
    #[error("target has already been defeated")]
    TargetDefeated,
    #[error("unit is not standing on that loot drop's tile")]
    NotOnLootTile,
    #[error("that loot drop has already been collected")]
    LootAlreadyCollected,
    #[error("internal invariant violated: {0}")]
    InvariantViolated(String),
}

impl ExecuteError {
    /// Stable code string for the wire protocol (same string `serde` would
    /// emit for the tag, kept as an explicit method so callers that only
    /// need the code don't have to serialize the whole error).
    pub fn code(&self) -> &'static str {
        match self {
            ExecuteError::CombatNotInProgress => "combat_not_in_progress",
            ExecuteError::UnknownUnit(_) => "unknown_unit",
            ExecuteError::UnknownLoot(_) => "unknown_loot",
            ExecuteError::NotYourTurn => "not_your_turn",
            ExecuteError::AlreadyActed => "already_acted",
            ExecuteError::InsufficientMovement => "insufficient_movement",
            ExecuteError::TileBlocked => "tile_blocked",
            ExecuteError::OutOfRange => "out_of_range",
            ExecuteError::NoLineOfSight => "no_line_of_sight",
            ExecuteError::TargetDefeated => "target_defeated",
            ExecuteError::NotOnLootTile => "not_on_loot_tile",
            ExecuteError::LootAlreadyCollected => "loot_already_collected",
            ExecuteError::InvariantViolated(_) => "invariant_violation",
        }
    }

    /// Whether this error is fatal to the whole session (ends it outright)
    /// rather than just this one rejected action.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecuteError::InvariantViolated(_))
    }
}
