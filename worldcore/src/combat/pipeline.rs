//! Combat pipeline glue (§4.5.1, §4.5.2): wires resist mitigation, absorb
//! shields, crowd-control breaking, and threat crediting into the two
//! entry points callers actually use — damaging an NPC, damaging a
//! player — plus the per-tick HOT/DOT pass.

use crate::character::Character;
use crate::clock::Millis;
use crate::entity::Entity;
use crate::ids::EntityId;
use crate::npc::runtime::NpcRuntime;
use crate::npc::threat::{self, ThreatTransferEffect};

use super::damage::{apply_damage_to_entity, apply_healing_to_entity, apply_resist_mitigation, DamageOutcome, ResistConfig};
use super::status::{self, DamageSchool};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombatOutcome {
    pub absorbed: i64,
    pub applied: i64,
    pub new_hp: i64,
    pub killed: bool,
    /// True when the target is service-protected (invulnerable) and the
    /// hit was rejected outright. A caller attacking a protected NPC on
    /// behalf of a player should record a crime even though no damage
    /// landed (`record_crime_for_protected_attack`).
    pub protected: bool,
}

impl CombatOutcome {
    fn from_damage(absorbed: i64, outcome: DamageOutcome, protected: bool) -> Self {
        Self { absorbed, applied: outcome.applied, new_hp: outcome.new_hp, killed: outcome.killed, protected }
    }
}

/// Damages an NPC: resist mitigation, absorb consumption, crowd-control
/// break on any damage that actually lands, then threat crediting (with
/// any active threat-transfer effect on the NPC redirecting a share).
/// No-op against an already-dead NPC.
#[allow(clippy::too_many_arguments)]
pub fn damage_to_npc(
    npc_entity: &mut Entity,
    npc_runtime: &mut NpcRuntime,
    attacker_id: EntityId,
    raw_damage: i64,
    resist: f64,
    school: Option<DamageSchool>,
    resist_cfg: &ResistConfig,
    now: Millis,
) -> CombatOutcome {
    if !npc_entity.alive {
        return CombatOutcome { absorbed: 0, applied: 0, new_hp: npc_entity.hp, killed: false, protected: false };
    }
    let protected = npc_entity.service.invulnerable;

    let mitigated = apply_resist_mitigation(raw_damage as f64, resist, resist_cfg);
    let (absorbed, residual) = status::absorb_incoming_damage_from_entity_status_effects(&mut npc_entity.status, mitigated, school, now);
    let outcome = apply_damage_to_entity(npc_entity, residual);

    let hit_damage = absorbed + residual;
    if hit_damage > 0 && outcome.new_hp > 0 {
        status::break_crowd_control_on_damage(&mut npc_entity.status);
    }
    if residual > 0 {
        credit_threat(npc_runtime, npc_entity, attacker_id, residual as f64, now);
    }

    CombatOutcome::from_damage(absorbed, outcome, protected)
}

/// Records a crime attempt against a service-protected NPC: attacking one
/// is illegal even though the attack itself is a no-op. Severity follows
/// whether the attempted hit would have been lethal had it landed.
pub fn record_crime_for_protected_attack(attacker: &mut Character, lethal: bool) {
    attacker.record_crime(lethal);
}

/// Same pipeline shape for a player victim, minus the threat bookkeeping
/// (players don't hold a threat table).
pub fn damage_to_player(
    player_entity: &mut Entity,
    raw_damage: i64,
    resist: f64,
    school: Option<DamageSchool>,
    resist_cfg: &ResistConfig,
    now: Millis,
) -> CombatOutcome {
    if !player_entity.alive {
        return CombatOutcome { absorbed: 0, applied: 0, new_hp: player_entity.hp, killed: false, protected: false };
    }
    let protected = player_entity.service.invulnerable;

    let mitigated = apply_resist_mitigation(raw_damage as f64, resist, resist_cfg);
    let (absorbed, residual) = status::absorb_incoming_damage_from_entity_status_effects(&mut player_entity.status, mitigated, school, now);
    let outcome = apply_damage_to_entity(player_entity, residual);

    let hit_damage = absorbed + residual;
    if hit_damage > 0 && outcome.new_hp > 0 {
        status::break_crowd_control_on_damage(&mut player_entity.status);
    }

    CombatOutcome::from_damage(absorbed, outcome, protected)
}

fn credit_threat(npc_runtime: &mut NpcRuntime, npc_entity: &Entity, attacker_id: EntityId, amount: f64, now: Millis) {
    let transfer_effects: Vec<ThreatTransferEffect> = npc_entity.status.threat_transfer_effects(now);
    if transfer_effects.is_empty() {
        threat::update_threat_from_damage(npc_runtime, attacker_id, amount, now);
        return;
    }
    for (recipient, share) in threat::resolve_threat_transfer(attacker_id, amount, &transfer_effects) {
        threat::add_threat_value(npc_runtime, recipient, share, now, Some(attacker_id));
    }
}

/// Heals an entity directly (spell/ability heal), returning the amount
/// actually restored (clamped to max hp).
pub fn apply_heal(entity: &mut Entity, amount: i64) -> i64 {
    apply_healing_to_entity(entity, amount)
}

pub struct HotDotTickResult {
    pub healed: i64,
    /// `(damage, school, applied_by_id)` per DOT tick due this pass.
    pub dot_hits: Vec<(i64, DamageSchool, String)>,
}

/// Runs any HOT/DOT ticks due on `entity` this pass. HOTs heal directly;
/// DOT damage is returned to the caller (not applied here) because a DOT
/// tick on an NPC needs to flow through `damage_to_npc` for threat
/// crediting, while a DOT on a player doesn't.
pub fn tick_hots_and_dots(entity: &mut Entity, now: Millis) -> HotDotTickResult {
    let hots_due = entity.status.hots_due(now);
    let mut healed = 0;
    for (_id, amount) in hots_due {
        healed += apply_healing_to_entity(entity, amount);
    }

    let dot_hits = entity.status.dots_due(now);

    HotDotTickResult { healed, dot_hits }
}
