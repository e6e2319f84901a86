//! NPC tick orchestration (§4.4.9): owns `NpcRuntime` storage and drives
//! every NPC through the fixed per-tick pass order — sanctuary recapture,
//! drift-home, fear flee, guard sortie, perception, threat decay/target
//! selection, train-chase, then brain dispatch. Every other `npc::*` module
//! is pure; this is where their results get committed back to the
//! `EntityRegistry` and where room broadcasts happen.

use std::collections::HashMap;

use rand::RngCore;
use serde_json::json;

use crate::character::Character;
use crate::clock::Millis;
use crate::combat::damage::{compute_npc_melee_damage, ResistConfig};
use crate::combat::pipeline;
use crate::config::Config;
use crate::entity::{Entity, EntityKind, Owner};
use crate::error::EngageError;
use crate::external::RegionFlagService;
use crate::ids::{EntityId, RoomId, SessionId};
use crate::protocol::ServerOpcode;
use crate::registry::EntityRegistry;
use crate::room::RoomTable;
use crate::session::SessionTable;
use crate::worker::BackgroundWorker;

use super::brain::{resolve_decision, Brain, DefaultBrain, Decision};
use super::engage::{is_valid_combat_target, CombatContext};
use super::pack_assist::{call_pack_assist, validate_ally_target, AllyCandidate, AssistThrottle};
use super::perception::{self, NpcPerception, PlayerSnapshot, RegionFlagCache};
use super::prototype::{Behavior, GuardProfile, NpcPrototype};
use super::runtime::NpcRuntime;
use super::sanctuary::{self, SanctuaryPressure, SiegeAlarm};
use super::threat::{self, CombatRole};
use super::train::{self, ChaseOutcome, TrainConfig};

/// Owns every live NPC's runtime state and the cross-NPC throttles
/// (assist, sanctuary pressure, siege alarm). One instance per shard/world.
pub struct NpcManager {
    runtimes: HashMap<EntityId, NpcRuntime>,
    prototypes: HashMap<String, NpcPrototype>,
    assist_throttle: AssistThrottle,
    sanctuary_pressure: SanctuaryPressure,
    siege_alarm: SiegeAlarm,
    region_flags: RegionFlagCache,
    brain: Box<dyn Brain>,
}

impl NpcManager {
    pub fn new(region_flag_min_refresh_ms: Millis) -> Self {
        Self {
            runtimes: HashMap::new(),
            prototypes: HashMap::new(),
            assist_throttle: AssistThrottle::new(),
            sanctuary_pressure: SanctuaryPressure::new(),
            siege_alarm: SiegeAlarm::new(),
            region_flags: RegionFlagCache::new(region_flag_min_refresh_ms),
            brain: Box::new(DefaultBrain),
        }
    }

    pub fn with_brain(mut self, brain: Box<dyn Brain>) -> Self {
        self.brain = brain;
        self
    }

    pub fn register_prototype(&mut self, proto: NpcPrototype) {
        self.prototypes.insert(proto.id.clone(), proto);
    }

    pub fn prototype(&self, proto_id: &str) -> Option<&NpcPrototype> {
        self.prototypes.get(proto_id)
    }

    /// Starts tracking a freshly-registered entity as a live NPC, seeding
    /// hp/maxHp from its prototype if one is registered.
    pub fn spawn(&mut self, entity_id: EntityId, proto_id: &str, room_id: RoomId) {
        let mut runtime = NpcRuntime::new(entity_id, proto_id, room_id);
        if let Some(proto) = self.prototypes.get(proto_id) {
            runtime.max_hp = proto.max_hp;
            runtime.hp = proto.max_hp;
        }
        self.runtimes.insert(entity_id, runtime);
    }

    pub fn despawn(&mut self, entity_id: EntityId) {
        self.runtimes.remove(&entity_id);
    }

    pub fn runtime(&self, entity_id: EntityId) -> Option<&NpcRuntime> {
        self.runtimes.get(&entity_id)
    }

    /// Mutable runtime access for callers that attach spawn-time metadata
    /// (template/variant id) or flip the death-pipeline idempotency
    /// markers (`rewards_granted`, `lifecycle_scheduled`).
    pub fn runtime_mut(&mut self, entity_id: EntityId) -> Option<&mut NpcRuntime> {
        self.runtimes.get_mut(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    /// All live NPC runtimes in `room_id`, mutable. Used by healing-to-threat
    /// bookkeeping, which must bump every NPC already engaged on either
    /// party in the healed entity's room.
    pub fn runtimes_in_room_mut(&mut self, room_id: &RoomId) -> Vec<&mut NpcRuntime> {
        self.runtimes.values_mut().filter(|rt| &rt.room_id == room_id).collect()
    }

    /// Drives every tracked NPC through one tick. Entities that vanished
    /// from the registry since the last tick (e.g. despawned elsewhere)
    /// drop their runtime silently.
    #[allow(clippy::too_many_arguments)]
    pub fn update_all(
        &mut self,
        now: Millis,
        registry: &mut EntityRegistry,
        rooms: &RoomTable,
        sessions: &SessionTable,
        characters: &HashMap<SessionId, Character>,
        region_flags: &(dyn RegionFlagService + Send + Sync),
        worker: &BackgroundWorker,
        cfg: &Config,
        resist_cfg: &ResistConfig,
        rng: &mut dyn RngCore,
    ) {
        let npc_ids: Vec<EntityId> = self.runtimes.keys().copied().collect();
        for npc_id in npc_ids {
            self.tick_one(now, npc_id, registry, rooms, sessions, characters, region_flags, worker, cfg, resist_cfg, rng);
        }
    }

    /// Called by the combat pipeline right after a hit lands on a
    /// help-calling NPC. Seeds/bumps threat on nearby group-mates and
    /// returns the ids notified, for logging/telemetry.
    pub fn on_npc_damaged(
        &mut self,
        npc_id: EntityId,
        attacker_id: EntityId,
        now: Millis,
        registry: &EntityRegistry,
        cfg: &Config,
    ) -> Vec<EntityId> {
        let Some(runtime) = self.runtimes.get(&npc_id) else { return vec![] };
        let Some(proto) = self.prototypes.get(&runtime.proto_id) else { return vec![] };
        if !proto.can_call_help {
            return vec![];
        }
        let Some(group) = proto.group_id.clone() else { return vec![] };
        let damaged_room = runtime.room_id.clone();
        let caller_threat = runtime.threat.get(attacker_id);

        if !self.assist_throttle.should_call(npc_id, &group, attacker_id, now, cfg, false) {
            return vec![];
        }

        let Some(attacker_entity) = registry.get(attacker_id) else { return vec![] };
        let attacker_stealthed = Self::target_stealthed(attacker_entity, now);
        let range = cfg.train.assist_range;

        let prototypes = &self.prototypes;
        let candidates: Vec<AllyCandidate> = self
            .runtimes
            .iter_mut()
            .filter(|(id, rt)| {
                **id != npc_id
                    && prototypes.get(&rt.proto_id).and_then(|p| p.group_id.as_deref()) == Some(group.as_str())
                    && rt
                        .room_id
                        .chebyshev_distance(&damaged_room)
                        .map(|d| d <= range)
                        .unwrap_or(rt.room_id == damaged_room)
            })
            .map(|(_, rt)| {
                let valid = match registry.get(rt.entity_id) {
                    Some(ally_entity) => validate_ally_target(now, ally_entity, attacker_entity, &rt.room_id, true, attacker_stealthed),
                    None => Err(EngageError::Dead),
                };
                AllyCandidate { runtime: rt, valid_target: valid }
            })
            .collect();

        call_pack_assist(&mut self.assist_throttle, candidates, attacker_id, damaged_room, caller_threat, now, cfg)
    }

    #[allow(clippy::too_many_arguments)]
    fn tick_one(
        &mut self,
        now: Millis,
        npc_id: EntityId,
        registry: &mut EntityRegistry,
        rooms: &RoomTable,
        sessions: &SessionTable,
        characters: &HashMap<SessionId, Character>,
        region_flags: &(dyn RegionFlagService + Send + Sync),
        worker: &BackgroundWorker,
        cfg: &Config,
        resist_cfg: &ResistConfig,
        rng: &mut dyn RngCore,
    ) {
        let Some(mut npc_entity) = registry.get(npc_id).cloned() else {
            self.runtimes.remove(&npc_id);
            return;
        };
        if !npc_entity.alive {
            return;
        }
        let Some(mut runtime) = self.runtimes.get(&npc_id).cloned() else { return };
        let Some(proto) = self.prototypes.get(&runtime.proto_id).cloned() else {
            tracing::warn!(npc = %npc_id, proto = %runtime.proto_id, "npc has no registered prototype, skipping tick");
            return;
        };

        let region_id = npc_entity.region_id.clone().unwrap_or_default();
        let (aggro_mode, is_sanctuary, has_breach) = self.region_flags.read(&region_id, now, region_flags, worker);
        let hostile_base = perception::is_hostile(&proto);
        let is_guard = matches!(proto.behavior, Behavior::Guard);

        if sanctuary::should_recapture(hostile_base, is_guard, is_sanctuary, has_breach) {
            runtime.threat.clear();
            npc_entity.room_id = npc_entity.room_id.step_toward(&runtime.spawn_room_id);
            runtime.room_id = npc_entity.room_id.clone();
            if self.sanctuary_pressure.record_pressure(
                &npc_entity.room_id,
                now,
                cfg.town_sanctuary_pressure_window_ms,
                cfg.town_sanctuary_pressure_threshold,
                cfg.town_sanctuary_pressure_cooldown_ms,
            ) && self.siege_alarm.should_raise(&npc_entity.room_id, now, cfg.town_siege_alarm_cooldown_ms)
            {
                tracing::info!(room = %npc_entity.room_id, "sanctuary pressure crossed threshold, recommending breach");
            }
            self.commit(registry, npc_id, npc_entity, runtime);
            return;
        }

        if runtime.train_returning && runtime.threat.is_empty() {
            let train_cfg = Self::train_config_for(&proto, cfg);
            train::tick_drift_home(&mut runtime, &mut npc_entity, &train_cfg);
        }

        if Self::has_fear_tag(&npc_entity, now) {
            let anchor_room = threat::get_top_threat_target(&runtime)
                .and_then(|id| registry.get(id))
                .map(|e| e.room_id.clone());
            super::fear::apply_fear_flee(&runtime, &mut npc_entity, true, anchor_room.as_ref());
            runtime.room_id = npc_entity.room_id.clone();
            self.commit(registry, npc_id, npc_entity, runtime);
            return;
        }

        if is_guard && proto.guard.guard_recapture_sweep && is_sanctuary {
            if let Some((target_room, hostile_id)) = self.find_recapture_target(registry, npc_id, &npc_entity.room_id, &proto.guard, has_breach, now, cfg) {
                threat::add_threat_value(&mut runtime, hostile_id, sanctuary::RECAPTURE_SEED_THREAT, now, Some(hostile_id));
                npc_entity.room_id = npc_entity.room_id.step_toward(&target_room);
                runtime.room_id = npc_entity.room_id.clone();
            }
        }

        let players_in_room = Self::players_snapshot(registry, characters, &npc_entity.room_id);

        let npc_room = npc_entity.room_id.clone();
        threat::decay_threat(
            &mut runtime,
            now,
            &|id| Self::role_for_target(registry, characters, id),
            &|id| Self::validate_target(registry, &npc_room, id, now, false),
        );
        // allow_cross_room=true: a pursuit target that stepped out of the
        // NPC's room must survive selection so train::tick_chase can still
        // chase it; decay above already penalizes it for being out of room.
        let target = threat::select_threat_target(&mut runtime, now, &|id| Self::validate_target(registry, &npc_room, id, now, true));

        if let Some(target_id) = target {
            if let Some(target_entity) = registry.get(target_id).cloned() {
                let train_cfg = Self::train_config_for(&proto, cfg);
                let outcome = train::tick_chase(&mut runtime, &mut npc_entity, &target_entity, &train_cfg, now);
                self.apply_chase_outcome(outcome, registry, &proto, &train_cfg, &mut npc_entity, &mut runtime, now);
            }
        }

        let perception = perception::build_perception(&runtime, &proto, is_sanctuary, aggro_mode, players_in_room, target);
        let decision = self.brain.decide(&perception, cfg.tick_interval_ms);
        let (resolved, stamp) = resolve_decision(decision, &perception, now, runtime.last_fallback_attack_at);
        runtime.last_fallback_attack_at = stamp;

        if let Some(decision) = resolved {
            let despawned = Self::dispatch(decision, registry, rooms, sessions, &proto, resist_cfg, rng, now, &mut npc_entity, &mut runtime);
            if despawned {
                self.runtimes.remove(&npc_id);
                return;
            }
        }

        self.commit(registry, npc_id, npc_entity, runtime);
    }

    fn commit(&mut self, registry: &mut EntityRegistry, npc_id: EntityId, npc_entity: Entity, mut runtime: NpcRuntime) {
        runtime.hp = npc_entity.hp;
        runtime.max_hp = npc_entity.max_hp;
        runtime.alive = npc_entity.alive;
        if let Some(slot) = registry.get_mut(npc_id) {
            *slot = npc_entity;
        }
        self.runtimes.insert(npc_id, runtime);
    }

    fn has_fear_tag(entity: &Entity, now: Millis) -> bool {
        entity.status.active(now).iter().any(|e| e.has_tag("fear"))
    }

    fn target_stealthed(entity: &Entity, now: Millis) -> bool {
        entity.status.active(now).iter().any(|e| e.has_tag("stealth"))
    }

    /// Derives the combat role a threat-table entry decays by (§4.4.1/§4.4.2).
    /// Non-player targets (other NPCs pulled via threat transfer, pets, etc.)
    /// have no class and decay at the default rate.
    fn role_for_target(registry: &EntityRegistry, characters: &HashMap<SessionId, Character>, target_id: EntityId) -> CombatRole {
        let Some(target) = registry.get(target_id) else { return CombatRole::Other };
        let Owner::Session(session_id) = &target.owner else { return CombatRole::Other };
        characters.get(session_id).map(|c| c.combat_role()).unwrap_or(CombatRole::Other)
    }

    fn validate_target(registry: &EntityRegistry, attacker_room: &RoomId, target_id: EntityId, now: Millis, allow_cross_room: bool) -> Result<(), EngageError> {
        let Some(target) = registry.get(target_id) else { return Err(EngageError::Dead) };
        let stealthed = Self::target_stealthed(target, now);
        is_valid_combat_target(&CombatContext {
            now,
            attacker: target,
            target,
            attacker_room_id: attacker_room,
            allow_cross_room,
            target_stealthed: stealthed,
        })
    }

    fn train_config_for(proto: &NpcPrototype, cfg: &Config) -> TrainConfig {
        match proto.pursue_profile {
            super::prototype::PursueProfile::Normal => cfg.train.clone(),
            super::prototype::PursueProfile::Short => cfg.train.clamped_for_short_profile(),
        }
    }

    fn players_snapshot(registry: &EntityRegistry, characters: &HashMap<SessionId, Character>, room_id: &RoomId) -> Vec<PlayerSnapshot> {
        registry
            .in_room(room_id)
            .into_iter()
            .filter(|e| e.kind == EntityKind::Player)
            .filter_map(|e| {
                let Owner::Session(session_id) = &e.owner else { return None };
                let character = characters.get(session_id)?;
                Some(perception::player_snapshot(e.id, character, session_id.clone()))
            })
            .collect()
    }

    /// Nearest player-targeting (or, under siege with proactive morale,
    /// recently-aggressive) NPC within the guard's sweep range, paired with
    /// the hostile entity it's currently engaged with.
    #[allow(clippy::too_many_arguments)]
    fn find_recapture_target(
        &self,
        registry: &EntityRegistry,
        self_id: EntityId,
        guard_room: &RoomId,
        guard: &GuardProfile,
        under_siege: bool,
        now: Millis,
        cfg: &Config,
    ) -> Option<(RoomId, EntityId)> {
        let range = sanctuary::sweep_range_tiles(guard, under_siege);
        let mut best: Option<(u32, RoomId, EntityId)> = None;
        for (id, rt) in self.runtimes.iter() {
            if *id == self_id {
                continue;
            }
            let target_id = threat::get_top_threat_target(rt);
            let targeting_player = target_id.and_then(|t| registry.get(t)).map(|e| e.kind == EntityKind::Player).unwrap_or(false);
            let recently_aggressive = rt
                .last_aggro_at
                .map(|t| now.saturating_sub(t) <= cfg.town_recently_aggressive_window_ms)
                .unwrap_or(false);
            let in_combat_or_recently_aggressive = !rt.threat.is_empty() || recently_aggressive;
            let eligible = targeting_player || (under_siege && guard.morale_proactive && in_combat_or_recently_aggressive);
            if !eligible {
                continue;
            }
            let Some(dist) = guard_room.chebyshev_distance(&rt.room_id) else { continue };
            if dist > range {
                continue;
            }
            let Some(hostile_id) = target_id.or(rt.last_attacker_entity_id) else { continue };
            if best.as_ref().map(|(d, ..)| dist < *d).unwrap_or(true) {
                best = Some((dist, rt.room_id.clone(), hostile_id));
            }
        }
        best.map(|(_, room, id)| (room, id))
    }

    fn apply_chase_outcome(
        &mut self,
        outcome: ChaseOutcome,
        registry: &mut EntityRegistry,
        proto: &NpcPrototype,
        train_cfg: &TrainConfig,
        npc_entity: &mut Entity,
        runtime: &mut NpcRuntime,
        now: Millis,
    ) {
        let ChaseOutcome::MovedToRoom(next_room) = outcome else { return };

        let dist_from_spawn = next_room.chebyshev_distance(&runtime.spawn_room_id);
        let exceeds_leash = dist_from_spawn.map(|d| d > train_cfg.max_rooms_from_spawn).unwrap_or(true);
        if exceeds_leash {
            npc_entity.pose = npc_entity.spawn_home;
            npc_entity.room_id = runtime.spawn_room_id.clone();
            runtime.room_id = runtime.spawn_room_id.clone();
            runtime.threat.clear();
            return;
        }

        if train_cfg.assist_enabled && train_cfg.assist_snap_allies {
            if let Some(group) = &proto.group_id {
                let old_room = npc_entity.room_id.clone();
                let max_allies = train_cfg.assist_snap_max_allies as usize;
                let prototypes = &self.prototypes;
                let mut moved = 0usize;
                for (id, ally) in self.runtimes.iter_mut() {
                    if *id == runtime.entity_id {
                        continue;
                    }
                    if max_allies != 0 && moved >= max_allies {
                        break;
                    }
                    if ally.room_id != old_room || ally.has_moved_this_tick(now) {
                        continue;
                    }
                    let same_group = prototypes.get(&ally.proto_id).and_then(|p| p.group_id.as_deref()) == Some(group.as_str());
                    if !same_group {
                        continue;
                    }
                    if let Some(ally_entity) = registry.get_mut(ally.entity_id) {
                        ally_entity.room_id = next_room.clone();
                    }
                    ally.room_id = next_room.clone();
                    ally.stamp_moved(now);
                    moved += 1;
                }
            }
        }

        npc_entity.room_id = next_room.clone();
        runtime.room_id = next_room;
        runtime.stamp_moved(now);
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        decision: Decision,
        registry: &mut EntityRegistry,
        rooms: &RoomTable,
        sessions: &SessionTable,
        proto: &NpcPrototype,
        resist_cfg: &ResistConfig,
        rng: &mut dyn RngCore,
        now: Millis,
        npc_entity: &mut Entity,
        runtime: &mut NpcRuntime,
    ) -> bool {
        match decision {
            Decision::AttackEntity { target } => {
                if Self::validate_target(registry, &npc_entity.room_id, target, now, false).is_err() {
                    return false;
                }
                let in_range = registry.get(target).map(|t| npc_entity.distance_xz(t) <= train::MELEE_RANGE).unwrap_or(false);
                if !in_range {
                    return false;
                }
                let damage = compute_npc_melee_damage(proto, rng);
                if let Some(target_entity) = registry.get_mut(target) {
                    let outcome = pipeline::damage_to_player(target_entity, damage, 0.0, None, resist_cfg, now);
                    rooms.broadcast(
                        &npc_entity.room_id,
                        sessions,
                        ServerOpcode::Chat,
                        json!({ "line": format!("{} hits you for {} damage.", display_name(proto), outcome.applied) }),
                    );
                }
                false
            }
            Decision::Flee => {
                runtime.fleeing = true;
                rooms.broadcast(
                    &npc_entity.room_id,
                    sessions,
                    ServerOpcode::Chat,
                    json!({ "line": format!("{} flees in terror!", display_name(proto)) }),
                );
                registry.remove_entity(npc_entity.id);
                rooms.broadcast(&npc_entity.room_id, sessions, ServerOpcode::EntityDespawn, json!({ "id": npc_entity.id.0 }));
                true
            }
            Decision::Say { line } => {
                rooms.broadcast(&npc_entity.room_id, sessions, ServerOpcode::Chat, json!({ "from": display_name(proto), "line": line }));
                false
            }
            Decision::MoveToRoom { room } => {
                npc_entity.room_id = room.clone();
                runtime.room_id = room;
                false
            }
            Decision::Idle => false,
        }
    }
}

fn display_name(proto: &NpcPrototype) -> &str {
    if proto.display_name.is_empty() {
        &proto.id
    } else {
        &proto.display_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Pose;
    use crate::session::test_support::RecordingSink;
    use rand::rngs::mock::StepRng;
    use std::sync::Arc;

    struct AllowAllRegionFlags;
    impl RegionFlagService for AllowAllRegionFlags {
        fn npc_aggro_mode(&self, _region_id: &str) -> crate::external::NpcAggroMode {
            crate::external::NpcAggroMode::Normal
        }
        fn is_sanctuary(&self, _region_id: &str) -> bool {
            false
        }
        fn has_active_breach(&self, _region_id: &str) -> bool {
            false
        }
    }

    fn harness() -> (EntityRegistry, RoomTable, SessionTable, HashMap<SessionId, Character>, BackgroundWorker, Config) {
        (
            EntityRegistry::new(),
            RoomTable::new(),
            SessionTable::new(),
            HashMap::new(),
            BackgroundWorker::spawn(4),
            Config { test_mode: true, ..Config::default() },
        )
    }

    #[test]
    fn pack_assist_seeds_threat_on_nearby_group_mates() {
        let room = RoomId::world("s", 0, 0);
        let mut registry = EntityRegistry::new();
        let attacker_id = registry.create_player_for_session(&SessionId("attacker".into()), room.clone());

        let mut manager = NpcManager::new(5_000);
        let mut proto = NpcPrototype::test_default("rat");
        proto.can_call_help = true;
        proto.group_id = Some("rat-pack".into());
        manager.register_prototype(proto);

        let damaged = registry.create_npc_entity(room.clone(), "rat");
        manager.spawn(damaged, "rat", room.clone());

        let ally = registry.create_npc_entity(room.clone(), "rat");
        manager.spawn(ally, "rat", room.clone());

        let cfg = Config::default();
        let notified = manager.on_npc_damaged(damaged, attacker_id, 0, &registry, &cfg);
        assert_eq!(notified, vec![ally]);
        assert!(manager.runtime(ally).unwrap().threat.get(attacker_id) > 0.0);
    }

    #[test]
    fn pack_assist_ignores_npcs_outside_assist_range() {
        let room = RoomId::world("s", 0, 0);
        let far_room = RoomId::world("s", 50, 50);
        let mut registry = EntityRegistry::new();
        let attacker_id = registry.create_player_for_session(&SessionId("attacker".into()), room.clone());

        let mut manager = NpcManager::new(5_000);
        let mut proto = NpcPrototype::test_default("rat");
        proto.can_call_help = true;
        proto.group_id = Some("rat-pack".into());
        manager.register_prototype(proto);

        let damaged = registry.create_npc_entity(room.clone(), "rat");
        manager.spawn(damaged, "rat", room.clone());
        let far_ally = registry.create_npc_entity(far_room.clone(), "rat");
        manager.spawn(far_ally, "rat", far_room);

        let cfg = Config::default();
        let notified = manager.on_npc_damaged(damaged, attacker_id, 0, &registry, &cfg);
        assert!(notified.is_empty());
    }

    #[test]
    fn coward_flees_below_threshold_instead_of_attacking() {
        let room = RoomId::world("s", 0, 0);
        let (mut registry, rooms, sessions, characters, worker, cfg) = harness();
        let sink = Arc::new(RecordingSink::default());
        // register the room so the flee broadcast has somewhere to land
        let mut rooms = rooms;
        let _ = sink;

        let mut manager = NpcManager::new(5_000);
        let mut proto = NpcPrototype::test_default("weasel");
        proto.behavior = Behavior::Coward;
        manager.register_prototype(proto);

        let npc_id = registry.create_npc_entity(room.clone(), "weasel");
        manager.spawn(npc_id, "weasel", room.clone());
        let target_id = registry.create_player_for_session(&SessionId("p1".into()), room.clone());

        if let Some(rt) = manager.runtimes.get_mut(&npc_id) {
            rt.hp = 2;
            rt.max_hp = 10;
            threat::update_threat_from_damage(rt, target_id, 5.0, 0);
        }
        if let Some(e) = registry.get_mut(npc_id) {
            e.hp = 2;
            e.max_hp = 10;
        }

        let resist_cfg = ResistConfig::default();
        let mut rng = StepRng::new(0, 1);
        let region_flags = AllowAllRegionFlags;
        manager.update_all(0, &mut registry, &mut rooms, &sessions, &characters, &region_flags, &worker, &cfg, &resist_cfg, &mut rng);

        assert!(registry.get(npc_id).is_none());
        assert!(manager.runtime(npc_id).is_none());
    }

    #[test]
    fn aggressive_npc_attacks_its_threat_target_on_tick() {
        let room = RoomId::world("s", 0, 0);
        let (mut registry, mut rooms, mut sessions, characters, worker, cfg) = harness();
        let sink = Arc::new(RecordingSink::default());
        sessions.register(SessionId("p1".into()), sink.clone());

        let mut manager = NpcManager::new(5_000);
        let mut proto = NpcPrototype::test_default("rat");
        proto.melee_damage_min = 3;
        proto.melee_damage_max = 3;
        manager.register_prototype(proto);

        let npc_id = registry.create_npc_entity(room.clone(), "rat");
        manager.spawn(npc_id, "rat", room.clone());
        rooms.join(&SessionId("p1".into()), &room, &mut registry, &sessions, None);
        let target_id = registry.by_owner(&SessionId("p1".into()))[0].id;

        if let Some(rt) = manager.runtimes.get_mut(&npc_id) {
            threat::update_threat_from_damage(rt, target_id, 5.0, 0);
        }

        let resist_cfg = ResistConfig::default();
        let mut rng = StepRng::new(0, 1);
        let region_flags = AllowAllRegionFlags;
        manager.update_all(0, &mut registry, &mut rooms, &sessions, &characters, &region_flags, &worker, &cfg, &resist_cfg, &mut rng);

        let target_hp_after = registry.get(target_id).unwrap().hp;
        assert_eq!(target_hp_after, 97);
        let msgs = sink.sent.lock().unwrap();
        assert!(msgs.iter().any(|e| e.op == ServerOpcode::Chat));
    }

    #[test]
    fn train_room_pursuit_snaps_grouped_allies_into_the_target_room() {
        let home = RoomId::world("s", 0, 0);
        let target_room = RoomId::world("s", 2, 0);
        let (mut registry, mut rooms, mut sessions, characters, worker, mut cfg) = harness();
        cfg.train.assist_enabled = true;
        cfg.train.assist_snap_allies = true;
        cfg.train.max_rooms_from_spawn = 10;

        let mut manager = NpcManager::new(5_000);
        let mut proto = NpcPrototype::test_default("wolf");
        proto.group_id = Some("wolf-pack".into());
        manager.register_prototype(proto);

        let leader = registry.create_npc_entity(home.clone(), "wolf");
        manager.spawn(leader, "wolf", home.clone());
        let ally = registry.create_npc_entity(home.clone(), "wolf");
        manager.spawn(ally, "wolf", home.clone());

        sessions.register(SessionId("p1".into()), Arc::new(RecordingSink::default()));
        rooms.join(&SessionId("p1".into()), &target_room, &mut registry, &sessions, None);
        let target_id = registry.by_owner(&SessionId("p1".into()))[0].id;
        registry.get_mut(target_id).unwrap().pose = Pose { x: 0.0, y: 0.0, z: 0.0, rot_y: 0.0 };

        if let Some(rt) = manager.runtimes.get_mut(&leader) {
            threat::update_threat_from_damage(rt, target_id, 5.0, 0);
            rt.last_aggro_at = Some(0);
        }

        let resist_cfg = ResistConfig::default();
        let mut rng = StepRng::new(0, 1);
        let region_flags = AllowAllRegionFlags;
        manager.update_all(0, &mut registry, &mut rooms, &sessions, &characters, &region_flags, &worker, &cfg, &resist_cfg, &mut rng);

        let leader_room = manager.runtime(leader).unwrap().room_id.clone();
        assert_eq!(leader_room, RoomId::world("s", 1, 0));
        let ally_room = manager.runtime(ally).unwrap().room_id.clone();
        assert_eq!(ally_room, leader_room);
        assert_eq!(registry.get(ally).unwrap().room_id, leader_room);
    }

    #[test]
    fn train_hard_leash_snaps_home_and_clears_threat_via_update_all() {
        let home = RoomId::world("s", 0, 0);
        let (mut registry, mut rooms, mut sessions, characters, worker, mut cfg) = harness();
        cfg.train.soft_leash = 10.0;
        cfg.train.hard_leash = 15.0;

        let mut manager = NpcManager::new(5_000);
        let mut proto = NpcPrototype::test_default("rat");
        manager.register_prototype(proto.clone());
        proto.melee_damage_min = 1;

        let npc_id = registry.create_npc_entity(home.clone(), "rat");
        manager.spawn(npc_id, "rat", home.clone());
        registry.get_mut(npc_id).unwrap().seed_spawn_home(Pose { x: 0.0, y: 0.0, z: 0.0, rot_y: 0.0 });
        registry.get_mut(npc_id).unwrap().pose = Pose { x: 200.0, y: 0.0, z: 0.0, rot_y: 0.0 };

        let target_id = registry.create_player_for_session(&SessionId("p1".into()), home.clone());
        registry.get_mut(target_id).unwrap().pose = Pose { x: 200.0, y: 0.0, z: 0.0, rot_y: 0.0 };
        sessions.register(SessionId("p1".into()), Arc::new(RecordingSink::default()));

        if let Some(rt) = manager.runtimes.get_mut(&npc_id) {
            threat::update_threat_from_damage(rt, target_id, 50.0, 0);
            rt.last_aggro_at = Some(0);
        }

        let resist_cfg = ResistConfig::default();
        let mut rng = StepRng::new(0, 1);
        let region_flags = AllowAllRegionFlags;
        manager.update_all(1_000, &mut registry, &mut rooms, &sessions, &characters, &region_flags, &worker, &cfg, &resist_cfg, &mut rng);

        let npc_after = registry.get(npc_id).unwrap();
        assert_eq!(npc_after.pose, npc_after.spawn_home);
        assert!(manager.runtime(npc_id).unwrap().threat.is_empty());
    }

    #[test]
    fn role_for_target_resolves_a_players_class_to_its_combat_role() {
        use crate::character::{Character, CharacterClass};

        let room = RoomId::world("s", 0, 0);
        let mut registry = EntityRegistry::new();
        let session_id = SessionId("tank".into());
        let target_id = registry.create_player_for_session(&session_id, room);

        let mut characters = HashMap::new();
        let mut tank = Character::new("tank");
        tank.class = CharacterClass::Paladin;
        characters.insert(session_id, tank);

        assert_eq!(NpcManager::role_for_target(&registry, &characters, target_id), CombatRole::Tank);
    }

    #[test]
    fn role_for_target_defaults_to_other_with_no_backing_character() {
        let room = RoomId::world("s", 0, 0);
        let mut registry = EntityRegistry::new();
        let npc_id = registry.create_npc_entity(room, "rat");
        let characters = HashMap::new();

        assert_eq!(NpcManager::role_for_target(&registry, &characters, npc_id), CombatRole::Other);
    }

    #[test]
    fn tank_threat_decays_slower_than_a_dps_player_through_update_all() {
        use crate::character::{Character, CharacterClass};

        let room = RoomId::world("s", 0, 0);
        let (mut registry, mut rooms, mut sessions, mut characters, worker, cfg) = harness();

        let mut manager = NpcManager::new(5_000);
        let mut passive_proto = NpcPrototype::test_default("rat");
        passive_proto.behavior = Behavior::Passive;
        manager.register_prototype(passive_proto);
        let npc_id = registry.create_npc_entity(room.clone(), "rat");
        manager.spawn(npc_id, "rat", room.clone());

        sessions.register(SessionId("tank".into()), Arc::new(RecordingSink::default()));
        rooms.join(&SessionId("tank".into()), &room, &mut registry, &sessions, None);
        let tank_id = registry.by_owner(&SessionId("tank".into()))[0].id;
        let mut tank = Character::new("tank");
        tank.class = CharacterClass::Warrior;
        characters.insert(SessionId("tank".into()), tank);

        if let Some(rt) = manager.runtimes.get_mut(&npc_id) {
            threat::update_threat_from_damage(rt, tank_id, 100.0, 0);
            rt.last_aggro_at = Some(0);
        }
        let threat_before = manager.runtime(npc_id).unwrap().threat.get(tank_id);

        let resist_cfg = ResistConfig::default();
        let mut rng = StepRng::new(0, 1);
        let region_flags = AllowAllRegionFlags;
        manager.update_all(100, &mut registry, &mut rooms, &sessions, &characters, &region_flags, &worker, &cfg, &resist_cfg, &mut rng);
        let tank_threat_after = manager.runtime(npc_id).unwrap().threat.get(tank_id);

        // an Other-role player under the same setup decays at the faster default rate
        let other_npc_id = registry.create_npc_entity(room.clone(), "rat");
        manager.spawn(other_npc_id, "rat", room);
        sessions.register(SessionId("dps".into()), Arc::new(RecordingSink::default()));
        let dps_id = registry.create_player_for_session(&SessionId("dps".into()), RoomId::world("s", 0, 0));
        let mut dps = Character::new("dps");
        dps.class = CharacterClass::Rogue;
        characters.insert(SessionId("dps".into()), dps);
        if let Some(rt) = manager.runtimes.get_mut(&other_npc_id) {
            threat::update_threat_from_damage(rt, dps_id, 100.0, 0);
            rt.last_aggro_at = Some(0);
        }
        manager.update_all(100, &mut registry, &mut rooms, &sessions, &characters, &region_flags, &worker, &cfg, &resist_cfg, &mut rng);
        let dps_threat_after = manager.runtime(other_npc_id).unwrap().threat.get(dps_id);

        assert!(threat_before > tank_threat_after);
        assert!(tank_threat_after > dps_threat_after);
    }

    #[test]
    fn guard_recapture_sweep_picks_up_in_combat_npc_under_siege_with_morale_proactive() {
        let guard_room = RoomId::world("s", 0, 0);
        let hostile_room = RoomId::world("s", 1, 0);
        let mut registry = EntityRegistry::new();

        let mut manager = NpcManager::new(5_000);
        let mut guard_proto = NpcPrototype::test_default("town_guard");
        guard_proto.behavior = Behavior::Guard;
        guard_proto.guard.guard_recapture_sweep = true;
        guard_proto.guard.guard_sortie = true;
        guard_proto.guard.range_tiles = 2;
        guard_proto.guard.siege_bonus_tiles = 0;
        guard_proto.guard.morale_proactive = true;
        manager.register_prototype(guard_proto.clone());

        let guard_id = registry.create_npc_entity(guard_room.clone(), "town_guard");
        manager.spawn(guard_id, "town_guard", guard_room.clone());

        manager.register_prototype(NpcPrototype::test_default("brigand"));
        let hostile_id = registry.create_npc_entity(hostile_room.clone(), "brigand");
        manager.spawn(hostile_id, "brigand", hostile_room.clone());

        // hostile has no player target but was recently aggressive (fought
        // something that's since left) and is in combat range under siege.
        let attacker_id = EntityId(9001);
        if let Some(rt) = manager.runtimes.get_mut(&hostile_id) {
            threat::update_threat_from_damage(rt, attacker_id, 10.0, 0);
            rt.last_aggro_at = Some(0);
        }

        let found = manager.find_recapture_target(&registry, guard_id, &guard_room, &guard_proto.guard, true, 500, &Config::default());
        assert_eq!(found, Some((hostile_room, attacker_id)));
    }

    #[test]
    fn guard_recapture_sweep_ignores_idle_non_aggressive_npc_without_siege_morale() {
        let guard_room = RoomId::world("s", 0, 0);
        let hostile_room = RoomId::world("s", 1, 0);
        let mut registry = EntityRegistry::new();

        let mut manager = NpcManager::new(5_000);
        let mut guard_proto = NpcPrototype::test_default("town_guard");
        guard_proto.guard.range_tiles = 2;
        guard_proto.guard.morale_proactive = true;
        manager.register_prototype(guard_proto.clone());

        let guard_id = registry.create_npc_entity(guard_room.clone(), "town_guard");
        manager.spawn(guard_id, "town_guard", guard_room.clone());

        manager.register_prototype(NpcPrototype::test_default("brigand"));
        let hostile_id = registry.create_npc_entity(hostile_room.clone(), "brigand");
        manager.spawn(hostile_id, "brigand", hostile_room);

        // not under siege: the morale-proactive branch must not fire even
        // though the hostile is in combat.
        let attacker_id = EntityId(9002);
        if let Some(rt) = manager.runtimes.get_mut(&hostile_id) {
            threat::update_threat_from_damage(rt, attacker_id, 10.0, 0);
            rt.last_aggro_at = Some(0);
        }

        let found = manager.find_recapture_target(&registry, guard_id, &guard_room, &guard_proto.guard, false, 500, &Config::default());
        assert_eq!(found, None);
    }
}
