//! Simulation Core: the deterministic data model and the `execute` dispatch
//! that is the single point of truth for every combat rule.

pub mod action;
pub mod ai;
pub mod combat;
pub mod events;
pub mod execute;
pub mod inventory;
pub mod loot;
pub mod state;
pub mod unit;
pub mod weapon;

pub use action::{Action, ExecuteError};
pub use combat::{Combat, CombatStatus, TurnState};
pub use events::GameEvent;
pub use execute::{execute, start_combat, valid_attack_targets, valid_move_targets};
pub use inventory::PlayerInventory;
pub use loot::{LootContents, LootDrop, LootId};
pub use state::GameState;
pub use unit::{PrincipalId, Stats, Unit, UnitId, UnitKind, WeaponId};
pub use weapon::Weapon;
