//! Persisted player state (§3, §6), modeled on the teacher's
//! `PlayerProfile`: a plain serializable struct with a version field, kept
//! separate from the live `Entity` so that loading/saving is just a
//! `CharacterStore` call and never touches the registry directly.

use serde::{Deserialize, Serialize};

use crate::ids::RoomId;
use crate::npc::threat::CombatRole;

/// Broad combat archetype a character's class falls into. Drives
/// `combat_role` (§4.4.1), which in turn modulates threat decay (§4.4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterClass {
    Warrior,
    Paladin,
    Cleric,
    Druid,
    Rogue,
    Mage,
    Ranger,
}

impl CharacterClass {
    pub fn combat_role(self) -> CombatRole {
        match self {
            CharacterClass::Warrior | CharacterClass::Paladin => CombatRole::Tank,
            CharacterClass::Cleric | CharacterClass::Druid => CombatRole::Healer,
            CharacterClass::Rogue | CharacterClass::Mage | CharacterClass::Ranger => CombatRole::Dps,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Character {
    pub version: u32,
    pub name: String,
    pub class: CharacterClass,

    pub room_id: Option<RoomId>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rot_y: f64,

    pub hp: i64,
    pub max_hp: i64,

    pub last_region_id: Option<String>,

    pub xp: u64,
    pub level: u32,

    /// Crime heat accumulated against protected NPCs, used by guard
    /// fallback attack selection. Decays externally; this core only reads
    /// and increments it.
    pub crime_heat_minor: u32,
    pub crime_heat_severe: u32,

    pub total_playtime_ms: u64,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: 1,
            name: name.into(),
            class: CharacterClass::Warrior,
            room_id: None,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            rot_y: 0.0,
            hp: 100,
            max_hp: 100,
            last_region_id: None,
            xp: 0,
            level: 1,
            crime_heat_minor: 0,
            crime_heat_severe: 0,
            total_playtime_ms: 0,
        }
    }

    pub fn combat_role(&self) -> CombatRole {
        self.class.combat_role()
    }

    pub fn has_severe_recent_crime(&self) -> bool {
        self.crime_heat_severe > 0
    }

    pub fn record_crime(&mut self, lethal: bool) {
        if lethal {
            self.crime_heat_severe += 1;
        } else {
            self.crime_heat_minor += 1;
        }
    }

    pub fn heal_to_full(&mut self) {
        self.hp = self.max_hp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_crime_buckets_by_lethality() {
        let mut c = Character::new("test");
        c.record_crime(false);
        c.record_crime(true);
        assert_eq!(c.crime_heat_minor, 1);
        assert_eq!(c.crime_heat_severe, 1);
        assert!(c.has_severe_recent_crime());
    }
}
