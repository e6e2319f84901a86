//! Train System (§4.4.5): pursuit with soft/hard leash, room stepping,
//! and drift-home. Configured at region granularity; the `short` pursue
//! profile (§prototype.rs `PursueProfile::Short`) clamps these down.

use crate::clock::Millis;
use crate::entity::Entity;
use crate::ids::{EntityId, RoomId};

use super::runtime::NpcRuntime;
use super::threat::{get_top_threat_target, ThreatState};

pub const MELEE_RANGE: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainProfile {
    Snap,
    Drift,
}

#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub enabled: bool,
    pub step: f64,
    pub soft_leash: f64,
    pub hard_leash: f64,
    pub pursue_timeout_ms: Millis,
    pub rooms_enabled: bool,
    pub max_rooms_from_spawn: u32,
    pub assist_enabled: bool,
    pub assist_snap_allies: bool,
    pub assist_snap_max_allies: u32,
    pub assist_range: u32,
    pub return_mode: TrainProfile,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            step: 1.5,
            soft_leash: 25.0,
            hard_leash: 40.0,
            pursue_timeout_ms: 20_000,
            rooms_enabled: true,
            max_rooms_from_spawn: 6,
            assist_enabled: true,
            assist_snap_allies: false,
            assist_snap_max_allies: 6,
            assist_range: 10,
            return_mode: TrainProfile::Snap,
        }
    }
}

impl TrainConfig {
    /// Region pursuit profile `short`: clamps down leashes/timeout/room
    /// range and disables assist.
    pub fn clamped_for_short_profile(&self) -> TrainConfig {
        TrainConfig {
            soft_leash: self.soft_leash.min(12.0),
            hard_leash: self.hard_leash.min(20.0),
            pursue_timeout_ms: self.pursue_timeout_ms.min(6_000),
            max_rooms_from_spawn: self.max_rooms_from_spawn.min(1),
            assist_enabled: false,
            ..self.clone()
        }
    }
}

pub enum ChaseOutcome {
    /// No pursuit-relevant state (no threat target, or already in melee
    /// range with nothing else to do).
    NoAction,
    MovedToRoom(RoomId),
    DisengagedAndSnappedHome,
    DisengagedDrifting,
    SteppedToward { distance_remaining: f64 },
}

/// One tick of train-chase logic for an NPC with a top-threat target.
/// Room stepping, sanctuary checks, and pack-assist-snap-before-leader-move
/// are orchestrated by the caller (`manager.rs`); this function handles the
/// "same room" distance/leash math plus the cross-room room-id computation.
#[allow(clippy::too_many_arguments)]
pub fn tick_chase(
    npc: &mut NpcRuntime,
    npc_entity: &mut Entity,
    target_entity: &Entity,
    cfg: &TrainConfig,
    now: Millis,
) -> ChaseOutcome {
    if npc.has_moved_this_tick(now) {
        return ChaseOutcome::NoAction;
    }

    if npc_entity.room_id != target_entity.room_id {
        if !cfg.rooms_enabled {
            return ChaseOutcome::NoAction;
        }
        let next_room = npc_entity.room_id.step_toward(&target_entity.room_id);
        return ChaseOutcome::MovedToRoom(next_room);
    }

    let dist = npc_entity.distance_xz(target_entity);
    if dist <= MELEE_RANGE {
        return ChaseOutcome::NoAction;
    }

    let dist_from_spawn = npc_entity.distance_from_spawn_xz();
    let timed_out = npc.last_aggro_at.map(|t| now.saturating_sub(t) >= cfg.pursue_timeout_ms).unwrap_or(false);
    if dist_from_spawn >= cfg.hard_leash || timed_out {
        return match cfg.return_mode {
            TrainProfile::Snap => {
                npc_entity.pose = npc_entity.spawn_home;
                npc.threat = ThreatState::default();
                npc.stamp_moved(now);
                ChaseOutcome::DisengagedAndSnappedHome
            }
            TrainProfile::Drift => {
                npc.train_returning = true;
                ChaseOutcome::DisengagedDrifting
            }
        };
    }

    let factor = if dist_from_spawn > cfg.soft_leash {
        (1.0 - (dist_from_spawn - cfg.soft_leash) / (cfg.hard_leash - cfg.soft_leash).max(f64::EPSILON)).max(0.15)
    } else {
        1.0
    };

    let step = cfg.step * factor;
    let dx = target_entity.pose.x - npc_entity.pose.x;
    let dz = target_entity.pose.z - npc_entity.pose.z;
    let len = (dx * dx + dz * dz).sqrt().max(f64::EPSILON);
    npc_entity.pose.x += dx / len * step.min(len);
    npc_entity.pose.z += dz / len * step.min(len);
    npc.stamp_moved(now);
    ChaseOutcome::SteppedToward { distance_remaining: (len - step).max(0.0) }
}

/// Drift-home pass (runs before perception): for an NPC whose
/// `train_returning` is set and whose threat table is empty, step one room
/// toward the spawn room (if rooms enabled) or walk toward spawn coords.
/// On arrival, snap to exact spawn coords and clear `train_returning`.
pub fn tick_drift_home(npc: &mut NpcRuntime, npc_entity: &mut Entity, cfg: &TrainConfig) -> bool {
    if !npc.train_returning || !npc.threat.is_empty() {
        return false;
    }

    if npc_entity.room_id != npc.spawn_room_id {
        if cfg.rooms_enabled {
            npc_entity.room_id = npc_entity.room_id.step_toward(&npc.spawn_room_id);
        }
        return true;
    }

    let dx = npc_entity.spawn_home.x - npc_entity.pose.x;
    let dz = npc_entity.spawn_home.z - npc_entity.pose.z;
    let dist = (dx * dx + dz * dz).sqrt();
    if dist <= cfg.step {
        npc_entity.pose = npc_entity.spawn_home;
        npc.train_returning = false;
        return true;
    }
    let len = dist.max(f64::EPSILON);
    npc_entity.pose.x += dx / len * cfg.step;
    npc_entity.pose.z += dz / len * cfg.step;
    true
}

pub fn has_threat_target(npc: &NpcRuntime) -> Option<EntityId> {
    get_top_threat_target(npc)
}
