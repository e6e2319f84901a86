//! Damage math (§4.5.2, §4.5.3): resist mitigation, NPC melee damage roll,
//! and applying a final damage number to an entity's hp. Pure functions —
//! the orchestration that gathers inputs (absorb, threat, crime, death)
//! lives in `pipeline.rs`.

use rand::Rng;

use crate::entity::Entity;
use crate::npc::prototype::NpcPrototype;

pub use super::status::DamageSchool;

/// Resist curve: `1 - clamp(resist / k, 0, cap_reduction)`. Diminishing
/// returns past `k` resist, capped so resist alone never fully negates a
/// hit.
#[derive(Clone, Copy, Debug)]
pub struct ResistConfig {
    pub k: f64,
    pub cap_reduction: f64,
}

impl Default for ResistConfig {
    fn default() -> Self {
        Self { k: 200.0, cap_reduction: 0.75 }
    }
}

pub fn resist_multiplier(resist: f64, cfg: &ResistConfig) -> f64 {
    if !resist.is_finite() || resist <= 0.0 {
        return 1.0;
    }
    let reduction = (resist / cfg.k).clamp(0.0, cfg.cap_reduction);
    1.0 - reduction
}

/// Applies resist mitigation to a raw damage number, floors to an integer,
/// and enforces a minimum of 1 damage on any positive hit (a mitigated hit
/// that rounds to zero still chips something — matches the NPC/player
/// damage floor used throughout the pipeline).
pub fn apply_resist_mitigation(raw_damage: f64, resist: f64, cfg: &ResistConfig) -> i64 {
    if !raw_damage.is_finite() || raw_damage <= 0.0 {
        return 0;
    }
    let mitigated = raw_damage * resist_multiplier(resist, cfg);
    (mitigated.floor() as i64).max(1)
}

/// Rolls an NPC's melee swing from its prototype's damage band. `min` may
/// equal `max`; if `min > max` the band collapses to `min`.
pub fn compute_npc_melee_damage(proto: &NpcPrototype, rng: &mut impl Rng) -> i64 {
    let lo = proto.melee_damage_min;
    let hi = proto.melee_damage_max.max(lo);
    if lo >= hi {
        return lo.max(0);
    }
    rng.gen_range(lo..=hi)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageOutcome {
    pub applied: i64,
    pub new_hp: i64,
    pub killed: bool,
}

/// Applies an already-mitigated, already-absorbed damage amount directly
/// to an entity's hp. Invulnerable entities (service NPCs, ...) take the
/// hit for bookkeeping but it never moves hp below 1, and never kills.
pub fn apply_damage_to_entity(entity: &mut Entity, amount: i64) -> DamageOutcome {
    if amount <= 0 || !entity.alive {
        return DamageOutcome { applied: 0, new_hp: entity.hp, killed: false };
    }
    if entity.service.invulnerable {
        let new_hp = entity.hp.max(1);
        entity.hp = new_hp;
        return DamageOutcome { applied: 0, new_hp, killed: false };
    }
    let new_hp = (entity.hp - amount).max(0);
    entity.hp = new_hp;
    let killed = new_hp == 0;
    if killed {
        entity.alive = false;
    }
    DamageOutcome { applied: amount, new_hp, killed }
}

pub fn apply_healing_to_entity(entity: &mut Entity, amount: i64) -> i64 {
    if amount <= 0 || !entity.alive {
        return 0;
    }
    let before = entity.hp;
    entity.hp = (entity.hp + amount).min(entity.max_hp);
    entity.hp - before
}
