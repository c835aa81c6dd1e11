//! Units: players, NPCs, and monsters occupying the grid.

use serde::{Deserialize, Serialize};

use crate::core::Position;

/// A unit's identifier. Plain, lexicographically ordered strings, assigned
/// deterministically at spawn time (roster order for players, a counter for
/// NPCs/monsters) so initiative tie-breaking reproduces identically on
/// replay.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(s: impl Into<String>) -> Self {
        UnitId(s.into())
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A weapon's identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeaponId(pub String);

impl WeaponId {
    pub fn new(s: impl Into<String>) -> Self {
        WeaponId(s.into())
    }
}

/// An authenticated principal's identifier (as consumed from `network::auth`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(s: impl Into<String>) -> Self {
        PrincipalId(s.into())
    }
}

/// What kind of actor a unit represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Player,
    Npc,
    Monster,
}

/// A unit's combat stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hp: u32,
    pub hp_max: u32,
    pub attack: u32,
    pub defense: u32,
    pub initiative: i32,
    pub move_range: u32,
    pub attack_range: u32,
}

impl Stats {
    pub fn is_defeated(&self) -> bool {
        self.hp == 0
    }
}

/// A single unit on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub kind: UnitKind,
    /// Present only for player-controlled units.
    pub owner_principal: Option<PrincipalId>,
    pub stats: Stats,
    pub position: Position,
    pub equipped_weapon_id: Option<WeaponId>,
}

impl Unit {
    pub fn is_alive(&self) -> bool {
        !self.stats.is_defeated()
    }

    /// Apply damage, clamping at zero. Never drives `hp` below zero or above
    /// `hp_max` — the struct's core invariant.
    pub fn apply_damage(&mut self, amount: u32) {
        self.stats.hp = self.stats.hp.saturating_sub(amount);
    }

    pub fn heal(&mut self, amount: u32) {
        self.stats.hp = (self.stats.hp + amount).min(self.stats.hp_max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(hp: u32, hp_max: u32) -> Unit {
        Unit {
            id: UnitId::new("u1"),
            kind: UnitKind::Player,
            owner_principal: None,
            stats: Stats {
                hp,
                hp_max,
                attack: 5,
                defense: 2,
                initiative: 10,
                move_range: 4,
                attack_range: 1,
            },
            position: Position::ORIGIN,
            equipped_weapon_id: None,
        }
    }

    #[test]
    fn damage_never_underflows_hp() {
        let mut u = unit(3, 10);
        u.apply_damage(100);
        assert_eq!(u.stats.hp, 0);
        assert!(!u.is_alive());
    }

    #[test]
    fn heal_never_exceeds_hp_max() {
        let mut u = unit(8, 10);
        u.heal(100);
        assert_eq!(u.stats.hp, 10);
    }

    #[test]
    fn unit_id_ordering_is_lexicographic() {
        assert!(UnitId::new("a1") < UnitId::new("a2"));
        assert!(UnitId::new("monster-10") < UnitId::new("monster-2")); // lexicographic, not numeric
    }
}
