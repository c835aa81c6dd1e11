//! Events emitted by `execute` and `start_combat`.
//!
//! Events are display/notification data only — clients never reconstruct
//! state from them (see `client::reconciler`). Each `execute` call already
//! returns its events in causal order, so no separate priority-based re-sort
//! is needed: one action produces one ordered burst of events, never several
//! concurrent ones to interleave.

use serde::{Deserialize, Serialize};

use crate::core::Position;

use super::combat::CombatStatus;
use super::loot::{LootContents, LootId};
use super::unit::UnitId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    CombatStarted { seed: u32, round: u32 },
    UnitMoved { unit_id: UnitId, path: Vec<Position> },
    UnitAttacked { attacker_id: UnitId, target_id: UnitId },
    UnitDamaged {
        unit_id: UnitId,
        amount: u32,
        hp_remaining: u32,
    },
    UnitDefeated { unit_id: UnitId },
    LootCollected {
        unit_id: UnitId,
        loot_id: LootId,
        contents: LootContents,
    },
    TurnStarted { unit_id: UnitId, round: u32 },
    TurnTimeout { unit_id: UnitId },
    CombatEnded { status: CombatStatus },
}
