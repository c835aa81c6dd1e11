//! Loot drops: what a defeated monster leaves behind.

use serde::{Deserialize, Serialize};

use crate::core::{DeterministicRng, Position};

use super::unit::WeaponId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LootId(pub String);

impl LootId {
    pub fn new(s: impl Into<String>) -> Self {
        LootId(s.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootContents {
    pub gold: u64,
    pub silver: u64,
    pub weapons: Vec<WeaponId>,
}

impl LootContents {
    pub fn is_empty(&self) -> bool {
        self.gold == 0 && self.silver == 0 && self.weapons.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootDrop {
    pub id: LootId,
    pub position: Position,
    pub contents: LootContents,
}

/// Roll a defeated monster's drop.
///
/// Pure function of the session seed, the round it died in, and its own
/// unit id. Weighted over four outcomes: nothing, a silver trickle, a gold
/// haul, or a weapon, with weights nudged by `round` so later fights pay
/// out more.
pub fn roll_drop(session_seed: u32, round: u32, unit_id: &str) -> LootContents {
    let mut hasher_seed: u64 = session_seed as u64;
    for b in unit_id.as_bytes() {
        hasher_seed = hasher_seed.wrapping_mul(31).wrapping_add(*b as u64);
    }
    hasher_seed = hasher_seed.wrapping_mul(31).wrapping_add(round as u64);

    let mut rng = DeterministicRng::new(hasher_seed);

    let round_bonus = (round.min(10)) as u32;
    let table: [(u32, u8); 4] = [
        (35u32.saturating_sub(round_bonus), 0), // nothing, rarer in later rounds
        (30, 1),                                // silver
        (20 + round_bonus, 2),                  // gold
        (15 + round_bonus / 2, 3),               // weapon
    ];

    match rng.weighted_choice(&table) {
        Some(0) => LootContents::default(),
        Some(1) => LootContents {
            silver: 5 + rng.next_int(10) as u64,
            ..Default::default()
        },
        Some(2) => LootContents {
            gold: 2 + rng.next_int(5) as u64,
            ..Default::default()
        },
        Some(3) => {
            let catalog = super::weapon::catalog();
            let weapon = rng.choose(&catalog).expect("catalog is never empty");
            LootContents {
                weapons: vec![weapon.id.clone()],
                ..Default::default()
            }
        }
        _ => LootContents::default(),
    }
}
