//! `World` (§4.9): the aggregate that owns every subsystem and drives one
//! fixed-interval tick. Per tick, in order: expire status effects, run the
//! HOT/DOT pass over every player and NPC, drive `NpcManager::update_all`,
//! then drain `DeathPipeline`'s due corpse-despawn/respawn timers. Session
//! delivery is synchronous (`SessionSink::send`), so there is no flush step.
//!
//! `RoomTable` has no session-to-room reverse index, so `World` keeps its
//! own `current_room` map alongside it — the one piece of bookkeeping the
//! aggregate owns that no inner module does on its own.

use std::collections::HashMap;
use std::sync::Arc;

use rand::RngCore;
use serde_json::json;

use crate::character::Character;
use crate::clock::Millis;
use crate::combat::damage as damage_math;
use crate::combat::pipeline::{self, CombatOutcome};
use crate::combat::status::{self, DamageSchool, StatusEffectInstance};
use crate::config::Config;
use crate::death::DeathPipeline;
use crate::entity::{EntityKind, Owner};
use crate::external::{CharacterStore, ItemService, NodeDepletionService, RegionFlagService, SpawnPointService};
use crate::ids::{EntityId, RoomId, SessionId};
use crate::npc::manager::NpcManager;
use crate::protocol::ServerOpcode;
use crate::registry::EntityRegistry;
use crate::respawn::RespawnService;
use crate::room::RoomTable;
use crate::session::{SessionSink, SessionTable};
use crate::spawn::{SpawnController, SpawnPoint};
use crate::worker::BackgroundWorker;

use pipeline::ResistConfig;

/// How often `NpcManager` is allowed to re-query `RegionFlagService` for a
/// given region, rather than on every tick.
const REGION_FLAG_CACHE_REFRESH_MS: Millis = 5_000;

pub struct World {
    registry: EntityRegistry,
    rooms: RoomTable,
    sessions: SessionTable,
    characters: HashMap<SessionId, Character>,
    current_room: HashMap<SessionId, RoomId>,

    npc_manager: NpcManager,
    death_pipeline: DeathPipeline,
    spawn_controller: SpawnController,
    respawn_service: RespawnService,

    worker: BackgroundWorker,
    cfg: Config,
    resist_cfg: ResistConfig,
    shard_id: String,
}

impl World {
    pub fn new(
        shard_id: impl Into<String>,
        origin_region_id: impl Into<String>,
        cfg: Config,
        character_store: Arc<dyn CharacterStore>,
        item_service: Arc<dyn ItemService>,
        worker_queue_capacity: usize,
    ) -> Self {
        Self {
            registry: EntityRegistry::new(),
            rooms: RoomTable::new(),
            sessions: SessionTable::new(),
            characters: HashMap::new(),
            current_room: HashMap::new(),
            npc_manager: NpcManager::new(REGION_FLAG_CACHE_REFRESH_MS),
            death_pipeline: DeathPipeline::new(character_store.clone(), item_service),
            spawn_controller: SpawnController::new(),
            respawn_service: RespawnService::new(character_store, origin_region_id),
            worker: BackgroundWorker::spawn(worker_queue_capacity),
            resist_cfg: ResistConfig::default(),
            cfg,
            shard_id: shard_id.into(),
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn npc_manager(&self) -> &NpcManager {
        &self.npc_manager
    }

    pub fn npc_manager_mut(&mut self) -> &mut NpcManager {
        &mut self.npc_manager
    }

    pub fn character(&self, session_id: &SessionId) -> Option<&Character> {
        self.characters.get(session_id)
    }

    pub fn current_room_of(&self, session_id: &SessionId) -> Option<&RoomId> {
        self.current_room.get(session_id)
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    // --- session / room lifecycle -----------------------------------

    pub fn connect_session(&mut self, session_id: SessionId, sink: Arc<dyn SessionSink>) {
        self.sessions.register(session_id, sink);
    }

    /// Leaves whatever room the session currently occupies, drops its
    /// character and session record. Does not persist the character —
    /// callers that want a final save should do so before calling this.
    pub fn disconnect_session(&mut self, session_id: &SessionId) {
        self.leave_room(session_id);
        self.characters.remove(session_id);
        self.sessions.unregister(session_id);
    }

    pub fn attach_character(&mut self, session_id: SessionId, character: Character) {
        self.characters.insert(session_id, character);
    }

    /// Moves `session_id` into `room_id`, leaving its previous room first
    /// if it had one. A no-op if already in `room_id`.
    pub fn join_room(&mut self, session_id: &SessionId, room_id: RoomId) {
        if let Some(current) = self.current_room.get(session_id) {
            if *current == room_id {
                return;
            }
            let previous = current.clone();
            self.rooms.leave(session_id, &previous, &mut self.registry, &self.sessions);
        }
        let character = self.characters.get(session_id);
        self.rooms.join(session_id, &room_id, &mut self.registry, &self.sessions, character);
        self.current_room.insert(session_id.clone(), room_id);
    }

    pub fn leave_room(&mut self, session_id: &SessionId) {
        if let Some(room_id) = self.current_room.remove(session_id) {
            self.rooms.leave(session_id, &room_id, &mut self.registry, &self.sessions);
        }
    }

    fn player_entity_id(&self, session_id: &SessionId) -> Option<EntityId> {
        self.registry.by_owner(session_id).into_iter().find(|e| e.kind == EntityKind::Player).map(|e| e.id)
    }

    // --- combat wrappers ----------------------------------------------

    /// Damages an NPC and, if the hit is lethal, runs it through
    /// `DeathPipeline` with `attacker_id`'s owning session (if any) credited
    /// as the killer. Does not call `NpcManager::on_npc_damaged` — pack
    /// assist is a separate opt-in call a caller makes when it wants one.
    pub fn damage_npc(
        &mut self,
        npc_id: EntityId,
        attacker_id: EntityId,
        raw_damage: i64,
        resist: f64,
        school: Option<DamageSchool>,
        now: Millis,
        rng: &mut dyn RngCore,
    ) -> Option<CombatOutcome> {
        let entity = self.registry.get_mut(npc_id)?;
        let runtime = self.npc_manager.runtime_mut(npc_id)?;
        let outcome = pipeline::damage_to_npc(entity, runtime, attacker_id, raw_damage, resist, school, &self.resist_cfg, now);
        self.broadcast_entity_update(npc_id);
        if outcome.killed {
            self.finish_npc_death(npc_id, Some(attacker_id), now, rng);
        }
        Some(outcome)
    }

    pub fn damage_player(
        &mut self,
        session_id: &SessionId,
        raw_damage: i64,
        resist: f64,
        school: Option<DamageSchool>,
        now: Millis,
    ) -> Option<CombatOutcome> {
        let entity_id = self.player_entity_id(session_id)?;
        let entity = self.registry.get_mut(entity_id)?;
        let outcome = pipeline::damage_to_player(entity, raw_damage, resist, school, &self.resist_cfg, now);
        self.broadcast_entity_update(entity_id);
        Some(outcome)
    }

    /// Heals `target_id` for `amount`, then credits healing-to-threat on any
    /// NPC in the target's room already engaged on `healer` or `target_id`.
    pub fn heal_entity(&mut self, healer: EntityId, target_id: EntityId, amount: i64, now: Millis) -> i64 {
        let Some(entity) = self.registry.get_mut(target_id) else { return 0 };
        if !entity.alive {
            return 0;
        }
        let healed = pipeline::apply_heal(entity, amount);
        let room_id = entity.room_id.clone();
        if healed > 0 {
            let mut npcs = self.npc_manager.runtimes_in_room_mut(&room_id);
            crate::npc::threat::apply_healing_to_threat(&mut npcs, healer, target_id, healed as f64, self.cfg.threat_heal_mult, now);
            self.broadcast_entity_update(target_id);
        }
        healed
    }

    pub fn apply_status_effect(&mut self, target_id: EntityId, effect: StatusEffectInstance) -> Option<status::ApplyOutcome> {
        let entity = self.registry.get_mut(target_id)?;
        Some(entity.status.apply(effect))
    }

    /// Pack-assist pulse for a hit that just landed on `npc_id`. Separate
    /// from `damage_npc` by design: a caller decides per-ability whether a
    /// hit should be allowed to call for help.
    pub fn notify_npc_damaged(&mut self, npc_id: EntityId, attacker_id: EntityId, now: Millis) -> Vec<EntityId> {
        self.npc_manager.on_npc_damaged(npc_id, attacker_id, now, &self.registry, &self.cfg)
    }

    fn player_killer(&self, attacker_id: EntityId) -> Option<(&SessionId, &Character)> {
        let entity = self.registry.get(attacker_id)?;
        let Owner::Session(session_id) = &entity.owner else { return None };
        let character = self.characters.get(session_id)?;
        Some((session_id, character))
    }

    fn finish_npc_death(&mut self, npc_id: EntityId, attacker_id: Option<EntityId>, now: Millis, rng: &mut dyn RngCore) {
        let killer = attacker_id.and_then(|id| self.player_killer(id));
        self.death_pipeline.handle_npc_death(
            npc_id,
            killer,
            now,
            &mut self.registry,
            &mut self.npc_manager,
            &self.rooms,
            &self.sessions,
            &self.cfg,
            &self.worker,
            rng,
        );
    }

    fn broadcast_entity_update(&self, entity_id: EntityId) {
        let Some(entity) = self.registry.get(entity_id) else { return };
        self.rooms.broadcast(
            &entity.room_id,
            &self.sessions,
            ServerOpcode::EntityUpdate,
            json!({ "id": entity_id.0, "hp": entity.hp, "alive": entity.alive }),
        );
    }

    // --- spawn / respawn wrappers --------------------------------------

    pub fn reconcile_shared_spawns(&mut self, room_id: &RoomId, desired: &[SpawnPoint]) {
        self.spawn_controller.reconcile_shared(room_id, desired, &mut self.registry, &mut self.npc_manager, &self.rooms, &self.sessions);
    }

    pub fn reconcile_personal_spawns(
        &mut self,
        room_id: &RoomId,
        owner_session_id: &SessionId,
        desired: &[SpawnPoint],
        node_depletion: &(dyn NodeDepletionService + Send + Sync),
    ) {
        let Some(character) = self.characters.get(owner_session_id) else { return };
        self.spawn_controller.reconcile_personal(room_id, owner_session_id, desired, &mut self.registry, &self.npc_manager, character, node_depletion);
    }

    pub fn respawn_player(&mut self, session_id: &SessionId, spawn_points: &(dyn SpawnPointService + Send + Sync)) {
        let Some(character) = self.characters.get_mut(session_id) else { return };
        self.respawn_service.respawn_player(session_id, character, &self.shard_id, spawn_points, &self.worker);
    }

    // --- tick ------------------------------------------------------------

    pub fn tick(
        &mut self,
        now: Millis,
        region_flags: &(dyn RegionFlagService + Send + Sync),
        spawn_points: &(dyn SpawnPointService + Send + Sync),
        rng: &mut dyn RngCore,
    ) {
        self.prune_expired_status_effects(now);
        self.tick_hots_and_dots(now, rng);

        self.npc_manager.update_all(
            now,
            &mut self.registry,
            &self.rooms,
            &self.sessions,
            &self.characters,
            region_flags,
            &self.worker,
            &self.cfg,
            &self.resist_cfg,
            rng,
        );

        self.death_pipeline.process_due(now, &mut self.registry, &mut self.npc_manager, &self.rooms, &self.sessions, spawn_points);
    }

    fn prune_expired_status_effects(&mut self, now: Millis) {
        for entity in self.registry.iter_mut() {
            entity.status.prune_expired(now);
        }
    }

    fn tick_hots_and_dots(&mut self, now: Millis, rng: &mut dyn RngCore) {
        for npc_id in self.registry.ids_by_kind(EntityKind::Npc) {
            self.tick_hots_and_dots_on_npc(npc_id, now, rng);
        }
        for player_id in self.registry.ids_by_kind(EntityKind::Player) {
            self.tick_hots_and_dots_on_player(player_id, now);
        }
    }

    fn tick_hots_and_dots_on_npc(&mut self, npc_id: EntityId, now: Millis, rng: &mut dyn RngCore) {
        let dot_hits = {
            let Some(entity) = self.registry.get_mut(npc_id) else { return };
            if !entity.alive {
                return;
            }
            let result = pipeline::tick_hots_and_dots(entity, now);
            if result.healed > 0 {
                self.broadcast_entity_update(npc_id);
            }
            result.dot_hits
        };
        for (damage, school, applied_by_id) in dot_hits {
            self.apply_dot_tick_to_npc(npc_id, &applied_by_id, damage, school, now, rng);
        }
    }

    /// Applies one DOT tick of damage to a live NPC. When the DOT's applier
    /// resolves to an `EntityId` this routes through `damage_to_npc` so the
    /// hit credits threat like any other; an unresolvable applier (a
    /// free-form tag naming something other than a tracked entity) still
    /// applies the damage, just without threat or crowd-control bookkeeping.
    fn apply_dot_tick_to_npc(&mut self, npc_id: EntityId, applied_by_id: &str, damage: i64, school: DamageSchool, now: Millis, rng: &mut dyn RngCore) {
        let attacker_id = EntityId::parse_tag(applied_by_id);
        let killed = {
            let Some(entity) = self.registry.get_mut(npc_id) else { return };
            if !entity.alive {
                return;
            }
            match attacker_id {
                Some(attacker_id) => {
                    let Some(runtime) = self.npc_manager.runtime_mut(npc_id) else { return };
                    pipeline::damage_to_npc(entity, runtime, attacker_id, damage, 0.0, Some(school), &self.resist_cfg, now).killed
                }
                None => damage_math::apply_damage_to_entity(entity, damage).killed,
            }
        };
        self.broadcast_entity_update(npc_id);
        if killed {
            self.finish_npc_death(npc_id, attacker_id, now, rng);
        }
    }

    fn tick_hots_and_dots_on_player(&mut self, player_id: EntityId, now: Millis) {
        let changed = {
            let Some(entity) = self.registry.get_mut(player_id) else { return };
            if !entity.alive {
                return;
            }
            let result = pipeline::tick_hots_and_dots(entity, now);
            let mut changed = result.healed > 0;
            for (damage, school, _applied_by_id) in result.dot_hits {
                pipeline::damage_to_player(entity, damage, 0.0, Some(school), &self.resist_cfg, now);
                changed = true;
            }
            changed
        };
        if changed {
            self.broadcast_entity_update(player_id);
        }
    }
}
