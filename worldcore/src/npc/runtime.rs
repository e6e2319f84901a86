//! NPC runtime state (§3): the per-instance mutable data that rides
//! alongside an `Entity` of kind `Npc`. Kept separate from `Entity`
//! because it's NPC-specific and would otherwise bloat every entity kind.

use crate::clock::Millis;
use crate::ids::{EntityId, RoomId};

use super::threat::ThreatState;

#[derive(Clone, Debug)]
pub struct NpcRuntime {
    pub entity_id: EntityId,
    /// Stable identity used for quest/crime credit.
    pub proto_id: String,
    /// Resolved variant used for stats.
    pub template_id: String,
    pub variant_id: Option<String>,

    pub room_id: RoomId,
    pub spawn_room_id: RoomId,

    pub hp: i64,
    pub max_hp: i64,
    pub alive: bool,

    pub fleeing: bool,
    pub last_aggro_at: Option<Millis>,
    pub last_attacker_entity_id: Option<EntityId>,

    /// Set when disengaging in `drift` return mode; cleared on arrival
    /// back at spawn coords.
    pub train_returning: bool,
    /// Anti-double-move stamp: at most one room step per tick.
    pub train_moved_at: Option<Millis>,

    /// Last time the brain-fallback synthesized an `attack_entity` decision
    /// (cooldown 800ms, §4.4.8).
    pub last_fallback_attack_at: Option<Millis>,

    pub threat: ThreatState,

    /// Set by `DeathPipeline` the instant rewards are granted, so
    /// re-entrant death calls short-circuit.
    pub rewards_granted: bool,
    /// Set by `scheduleNpcCorpseAndRespawn`'s idempotency guard.
    pub lifecycle_scheduled: bool,
}

impl NpcRuntime {
    pub fn new(entity_id: EntityId, proto_id: impl Into<String>, room_id: RoomId) -> Self {
        Self {
            entity_id,
            proto_id: proto_id.into(),
            template_id: String::new(),
            variant_id: None,
            room_id: room_id.clone(),
            spawn_room_id: room_id,
            hp: 1,
            max_hp: 1,
            alive: true,
            fleeing: false,
            last_aggro_at: None,
            last_attacker_entity_id: None,
            train_returning: false,
            train_moved_at: None,
            last_fallback_attack_at: None,
            threat: ThreatState::default(),
            rewards_granted: false,
            lifecycle_scheduled: false,
        }
    }

    pub fn has_moved_this_tick(&self, now: Millis) -> bool {
        self.train_moved_at == Some(now)
    }

    pub fn stamp_moved(&mut self, now: Millis) {
        self.train_moved_at = Some(now);
    }
}
