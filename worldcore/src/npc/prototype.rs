//! NPC prototype (§3): the template an NPC runtime instance is spawned
//! from — stats, behavior, and the data pack assist/train/guard logic
//! reads every tick.

use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Behavior {
    Aggressive,
    Guard,
    Coward,
    Passive,
}

#[derive(Clone, Debug)]
pub struct LootEntry {
    pub item_id: String,
    pub chance: f64,
    pub min_qty: u32,
    pub max_qty: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PursueProfile {
    Normal,
    Short,
}

#[derive(Clone, Debug, Default)]
pub struct GuardProfile {
    pub guard_recapture_sweep: bool,
    pub guard_sortie: bool,
    pub range_tiles: u32,
    pub siege_bonus_tiles: u32,
    pub call_radius: u32,
    /// Under siege, also sweep up in-combat or recently-aggressive NPCs,
    /// not just ones actively targeting a player (§4.4.7).
    pub morale_proactive: bool,
}

#[derive(Clone, Debug)]
pub struct NpcPrototype {
    pub id: String,
    pub display_name: String,
    pub model: String,
    pub max_hp: i64,
    pub behavior: Behavior,
    pub tags: HashSet<String>,
    pub group_id: Option<String>,
    pub can_call_help: bool,
    pub can_gate: bool,
    pub xp_reward: Option<u64>,
    pub level: u32,
    pub loot: Vec<LootEntry>,
    pub guard: GuardProfile,
    pub pursue_profile: PursueProfile,
    pub melee_damage_min: i64,
    pub melee_damage_max: i64,
}

impl NpcPrototype {
    /// A minimal hostile prototype, used to keep test setup short. Real
    /// prototypes are loaded from the external content catalog.
    pub fn test_default(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: String::new(),
            model: String::new(),
            max_hp: 10,
            behavior: Behavior::Aggressive,
            tags: HashSet::new(),
            group_id: None,
            can_call_help: false,
            can_gate: false,
            xp_reward: None,
            level: 1,
            loot: vec![],
            guard: GuardProfile::default(),
            pursue_profile: PursueProfile::Normal,
            melee_damage_min: 1,
            melee_damage_max: 3,
        }
    }

    pub fn is_resource(&self) -> bool {
        self.tags.contains("resource") || self.tags.iter().any(|t| t.starts_with("resource:"))
    }

    pub fn is_non_hostile(&self) -> bool {
        self.tags.contains("non_hostile")
    }

    /// `xpReward` explicit or `5 + level*3`.
    pub fn xp_reward(&self) -> u64 {
        self.xp_reward.unwrap_or(5 + self.level as u64 * 3)
    }

    pub fn display_name_or_id(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}
