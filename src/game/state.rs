//! The full, serializable game state a session carries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::combat::Combat;
use super::inventory::PlayerInventory;
use super::loot::{LootDrop, LootId};
use super::unit::{PrincipalId, Unit, UnitId};

/// A compact record of one accepted action, kept for the persisted session
/// log and for debugging — not itself part of the wire diff (it only ever
/// grows by appending, and clients never need it to reconcile state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnHistoryEntry {
    pub sequence: u64,
    pub unit_id: UnitId,
    pub summary: String,
}

/// The pure, serializable value the simulation core operates over. The map
/// itself is never stored here beyond its seed — `map_seed` is all the diff
/// engine and wire protocol ever need, since `map::tile()` reconstructs
/// everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub map_seed: u32,
    pub units: BTreeMap<UnitId, Unit>,
    pub combat: Combat,
    pub loot_drops: BTreeMap<LootId, LootDrop>,
    pub inventories: BTreeMap<PrincipalId, PlayerInventory>,
    pub turn_history: Vec<TurnHistoryEntry>,
    pub next_action_sequence: u64,
}

impl GameState {
    pub fn new(map_seed: u32) -> Self {
        GameState {
            map_seed,
            units: BTreeMap::new(),
            combat: Combat::not_started(),
            loot_drops: BTreeMap::new(),
            inventories: BTreeMap::new(),
            turn_history: Vec::new(),
            next_action_sequence: 0,
        }
    }

    pub fn map(&self) -> crate::map::Map {
        crate::map::Map::new(self.map_seed)
    }

    /// Positions currently occupied by a living unit — the occupancy
    /// invariant (no two living units share a tile) is enforced by
    /// `execute` consulting this before any move/spawn.
    pub fn occupied_positions(&self) -> std::collections::BTreeSet<crate::core::Position> {
        self.units
            .values()
            .filter(|u| u.is_alive())
            .map(|u| u.position)
            .collect()
    }

    pub fn record_history(&mut self, unit_id: UnitId, summary: impl Into<String>) {
        let sequence = self.next_action_sequence;
        self.turn_history.push(TurnHistoryEntry {
            sequence,
            unit_id,
            summary: summary.into(),
        });
    }
}
