//! Player inventory: currency and owned/equipped weapons.

use serde::{Deserialize, Serialize};

use super::unit::WeaponId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInventory {
    pub gold: u64,
    pub silver: u64,
    pub owned_weapons: Vec<WeaponId>,
    pub equipped_weapon_id: Option<WeaponId>,
}

impl PlayerInventory {
    pub fn add_weapon(&mut self, id: WeaponId) {
        if !self.owned_weapons.contains(&id) {
            self.owned_weapons.push(id);
        }
    }

    pub fn equip(&mut self, id: WeaponId) -> bool {
        if self.owned_weapons.contains(&id) {
            self.equipped_weapon_id = Some(id);
            true
        } else {
            false
        }
    }
}
