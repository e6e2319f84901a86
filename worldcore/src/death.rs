//! `DeathPipeline` (§4.7): canonical NPC kill handling plus the corpse
//! despawn / respawn timers it schedules. Idempotency lives on
//! `NpcRuntime` (`rewards_granted`, `lifecycle_scheduled`) so a DOT tick
//! and a killing melee blow racing on the same NPC within one tick never
//! double-grant rewards or double-schedule a respawn.

use std::sync::Arc;

use rand::RngCore;
use serde_json::json;

use crate::character::Character;
use crate::clock::Millis;
use crate::combat::status;
use crate::config::Config;
use crate::entity::{Entity, Pose};
use crate::external::{CharacterStore, DeliveryOutcome, ItemService, SpawnPointService};
use crate::ids::{EntityId, RoomId, SessionId};
use crate::npc::manager::NpcManager;
use crate::npc::prototype::NpcPrototype;
use crate::npc::runtime::NpcRuntime;
use crate::protocol::ServerOpcode;
use crate::registry::EntityRegistry;
use crate::room::{entity_spawn_payload, RoomTable};
use crate::session::SessionTable;
use crate::worker::BackgroundWorker;

#[derive(Clone, Debug, Default)]
pub struct NpcDeathResult {
    pub xp_granted: Option<u64>,
    pub loot_lines: Vec<String>,
    pub corpse_scheduled: bool,
}

enum LifecycleKind {
    CorpseDespawn {
        entity_id: EntityId,
    },
    Respawn {
        proto_id: String,
        spawn_point_id: Option<i64>,
        spawn_id: Option<String>,
        region_id: Option<String>,
        room_id: RoomId,
        spawn_home: Pose,
    },
}

struct PendingLifecycle {
    due_at: Millis,
    kind: LifecycleKind,
}

pub struct DeathPipeline {
    character_store: Arc<dyn CharacterStore>,
    item_service: Arc<dyn ItemService>,
    pending: Vec<PendingLifecycle>,
}

impl DeathPipeline {
    pub fn new(character_store: Arc<dyn CharacterStore>, item_service: Arc<dyn ItemService>) -> Self {
        Self { character_store, item_service, pending: Vec::new() }
    }

    /// Idempotent: a re-entrant call for an NPC whose rewards were already
    /// granted this lifetime returns `None` without touching anything.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_npc_death(
        &mut self,
        npc_id: EntityId,
        killer: Option<(&SessionId, &Character)>,
        now: Millis,
        registry: &mut EntityRegistry,
        npc_manager: &mut NpcManager,
        rooms: &RoomTable,
        sessions: &SessionTable,
        cfg: &Config,
        worker: &BackgroundWorker,
        rng: &mut dyn RngCore,
    ) -> Option<NpcDeathResult> {
        if npc_manager.runtime(npc_id)?.rewards_granted {
            return None;
        }
        if let Some(rt) = npc_manager.runtime_mut(npc_id) {
            rt.rewards_granted = true;
        }

        let entity = registry.get_mut(npc_id)?;
        entity.hp = 0;
        entity.alive = false;
        status::clear_all_status_effects_from_entity(&mut entity.status);
        let snapshot = entity.clone();
        rooms.broadcast(&snapshot.room_id, sessions, ServerOpcode::EntityUpdate, json!({ "id": npc_id.0, "alive": false, "hp": 0 }));

        let runtime = npc_manager.runtime(npc_id)?.clone();
        let Some(proto) = npc_manager
            .prototype(&runtime.template_id)
            .or_else(|| npc_manager.prototype(&runtime.proto_id))
            .cloned()
        else {
            tracing::warn!(npc = %npc_id, "npc died with no resolvable prototype, skipping rewards");
            return Some(NpcDeathResult::default());
        };

        let mut result = NpcDeathResult::default();

        if let Some((session_id, character)) = killer {
            let xp = proto.xp_reward();
            result.xp_granted = Some(xp);
            let store = self.character_store.clone();
            let sid = session_id.clone();
            worker.submit(Box::new(move || store.grant_xp(&sid, xp)));

            for entry in &proto.loot {
                let roll = rng.next_u32() as f64 / u32::MAX as f64;
                if roll > entry.chance {
                    continue;
                }
                let qty = if entry.max_qty > entry.min_qty {
                    entry.min_qty + rng.next_u32() % (entry.max_qty - entry.min_qty + 1)
                } else {
                    entry.min_qty
                };
                if qty == 0 {
                    continue;
                }
                let outcome = self.item_service.deliver_item_to_bags_or_mail(session_id, &entry.item_id, qty);
                let destination = match outcome {
                    DeliveryOutcome::Bags => "your bags",
                    DeliveryOutcome::Mail => "mail (bags were full)",
                };
                result.loot_lines.push(format!("You receive {} x{} ({}).", entry.item_id, qty, destination));
            }

            let store = self.character_store.clone();
            let sid = session_id.clone();
            let character = character.clone();
            worker.submit(Box::new(move || store.save(&sid, &character)));
        }

        result.corpse_scheduled = self.schedule_npc_corpse_and_respawn(npc_id, &runtime, &proto, &snapshot, now, cfg, npc_manager);

        Some(result)
    }

    /// Idempotent via `lifecycle_scheduled`. Captures spawn metadata at
    /// schedule time, not at respawn time, so a catalog edit mid-flight
    /// can't retarget an already-dying NPC's respawn point.
    fn schedule_npc_corpse_and_respawn(
        &mut self,
        npc_id: EntityId,
        runtime: &NpcRuntime,
        proto: &NpcPrototype,
        entity_snapshot: &Entity,
        now: Millis,
        cfg: &Config,
        npc_manager: &mut NpcManager,
    ) -> bool {
        if npc_manager.runtime(npc_id).map(|rt| rt.lifecycle_scheduled).unwrap_or(true) {
            return false;
        }
        if let Some(rt) = npc_manager.runtime_mut(npc_id) {
            rt.lifecycle_scheduled = true;
        }

        let is_resource = proto.is_resource();
        let corpse_ms = if is_resource {
            cfg.corpse_resource_ms
        } else if proto.tags.contains("beast") || proto.tags.contains("critter") {
            cfg.corpse_beast_ms
        } else {
            cfg.corpse_npc_ms
        };

        self.pending.push(PendingLifecycle {
            due_at: now + corpse_ms,
            kind: LifecycleKind::CorpseDespawn { entity_id: npc_id },
        });

        if !is_resource {
            self.pending.push(PendingLifecycle {
                due_at: now + corpse_ms + cfg.respawn_after_corpse_ms,
                kind: LifecycleKind::Respawn {
                    proto_id: runtime.proto_id.clone(),
                    spawn_point_id: entity_snapshot.spawn_point_id,
                    spawn_id: entity_snapshot.spawn_id.clone(),
                    region_id: entity_snapshot.region_id.clone(),
                    room_id: runtime.spawn_room_id.clone(),
                    spawn_home: entity_snapshot.spawn_home,
                },
            });
        }

        true
    }

    /// Drains any corpse-despawn/respawn timer due by `now`. This is the
    /// lifecycle half of the tick's "scheduled callbacks" pass;
    /// `SpawnController` owns the catalog-reconciliation half.
    pub fn process_due(
        &mut self,
        now: Millis,
        registry: &mut EntityRegistry,
        npc_manager: &mut NpcManager,
        rooms: &RoomTable,
        sessions: &SessionTable,
        spawn_points: &(dyn SpawnPointService + Send + Sync),
    ) {
        let due: Vec<usize> = self.pending.iter().enumerate().filter(|(_, p)| p.due_at <= now).map(|(i, _)| i).collect();
        for i in due.into_iter().rev() {
            let pending = self.pending.remove(i);
            match pending.kind {
                LifecycleKind::CorpseDespawn { entity_id } => {
                    npc_manager.despawn(entity_id);
                    if let Some(removed) = registry.remove_entity(entity_id) {
                        rooms.broadcast(&removed.room_id, sessions, ServerOpcode::EntityDespawn, json!({ "id": entity_id.0 }));
                    }
                }
                LifecycleKind::Respawn { proto_id, spawn_point_id, spawn_id, region_id, room_id, spawn_home } => {
                    self.respawn_one(proto_id, spawn_point_id, spawn_id, region_id, room_id, spawn_home, registry, npc_manager, rooms, sessions, spawn_points);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn respawn_one(
        &self,
        proto_id: String,
        spawn_point_id: Option<i64>,
        spawn_id: Option<String>,
        region_id: Option<String>,
        room_id: RoomId,
        spawn_home: Pose,
        registry: &mut EntityRegistry,
        npc_manager: &mut NpcManager,
        rooms: &RoomTable,
        sessions: &SessionTable,
        spawn_points: &(dyn SpawnPointService + Send + Sync),
    ) {
        let Some(proto) = npc_manager.prototype(&proto_id).cloned() else {
            tracing::warn!(proto = %proto_id, "respawn skipped: prototype no longer registered");
            return;
        };

        let (x, y, z) = Self::updated_coords(spawn_point_id, &room_id, spawn_home, spawn_points);

        let entity_id = registry.create_npc_entity(room_id.clone(), proto_id.clone());
        if let Some(e) = registry.get_mut(entity_id) {
            e.prototype_id = Some(proto_id.clone());
            e.spawn_point_id = spawn_point_id;
            e.spawn_id = spawn_id;
            e.region_id = region_id;
            e.name = proto.display_name.clone();
            e.hp = proto.max_hp;
            e.max_hp = proto.max_hp;
            e.seed_spawn_home(Pose { x, y, z, rot_y: spawn_home.rot_y });
        }
        npc_manager.spawn(entity_id, &proto_id, room_id.clone());

        if let Some(snapshot) = registry.get(entity_id) {
            rooms.broadcast(&room_id, sessions, ServerOpcode::EntitySpawn, entity_spawn_payload(snapshot));
            rooms.broadcast(
                &room_id,
                sessions,
                ServerOpcode::Chat,
                json!({ "line": format!("{} has returned.", proto.display_name_or_id()) }),
            );
        }
    }

    /// Consults the spawn catalog for an updated position at the matching
    /// spawn point, falling back to the coordinates captured at schedule
    /// time when the catalog has nothing (or the point was manual/unowned).
    fn updated_coords(spawn_point_id: Option<i64>, room_id: &RoomId, fallback: Pose, spawn_points: &(dyn SpawnPointService + Send + Sync)) -> (f64, f64, f64) {
        let fallback_coords = (fallback.x, fallback.y, fallback.z);
        let (Some(shard), Some(wanted_id)) = (room_id.shard(), spawn_point_id) else {
            return fallback_coords;
        };
        spawn_points
            .get_spawn_points_near(shard, fallback.x, fallback.z, 50.0)
            .into_iter()
            .find(|p| p.id == wanted_id)
            .map(|p| (p.x, p.y, p.z))
            .unwrap_or(fallback_coords)
    }
}
