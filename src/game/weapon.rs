//! Weapon definitions.

use serde::{Deserialize, Serialize};

use super::unit::WeaponId;

/// A weapon a unit may equip, adding flat damage to its attacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub id: WeaponId,
    pub name: String,
    pub damage: u32,
}

/// The fixed catalog of weapons obtainable in a session. Kept small and
/// in-code rather than config-driven: there is no authored content pipeline.
pub fn catalog() -> Vec<Weapon> {
    vec![
        Weapon {
            id: WeaponId::new("rusty-sword"),
            name: "Rusty Sword".into(),
            damage: 1,
        },
        Weapon {
            id: WeaponId::new("iron-sword"),
            name: "Iron Sword".into(),
            damage: 3,
        },
        Weapon {
            id: WeaponId::new("war-axe"),
            name: "War Axe".into(),
            damage: 5,
        },
        Weapon {
            id: WeaponId::new("hunting-bow"),
            name: "Hunting Bow".into(),
            damage: 2,
        },
        Weapon {
            id: WeaponId::new("longbow"),
            name: "Longbow".into(),
            damage: 4,
        },
    ]
}

pub fn find(id: &WeaponId) -> Option<Weapon> {
    catalog().into_iter().find(|w| &w.id == id)
}
