//! `SpawnController` (§4.6): reconciles the external spawn-point catalog
//! against live entities. Two independent reconciliation passes —
//! shared NPCs (dedup by `spawnPointId` seen on live entities in the
//! room, not an internal set) and personal resource nodes (scoped by
//! `(roomId, ownerSessionId)`, guarded against reentrancy).

use std::collections::{HashMap, HashSet};

use crate::character::Character;
use crate::entity::{EntityKind, Owner, Pose};
use crate::external::NodeDepletionService;
use crate::ids::{EntityId, RoomId, SessionId};
use crate::npc::manager::NpcManager;
use crate::protocol::ServerOpcode;
use crate::registry::EntityRegistry;
use crate::room::{entity_spawn_payload, RoomTable};
use crate::session::SessionTable;

use super::point::{is_node_like_kind, is_npc_like_kind, SpawnPoint};

#[derive(Default)]
pub struct SpawnController {
    personal_in_flight: HashSet<(RoomId, SessionId)>,
}

impl SpawnController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles shared NPCs for `room_id` against `desired`. Despawns
    /// live NPCs whose spawn point fell out of the desired set, then
    /// spawns any desired point with no live NPC yet. Resource prototypes
    /// never spawn through this path even if the point's `kind` says npc.
    pub fn reconcile_shared(
        &mut self,
        room_id: &RoomId,
        desired: &[SpawnPoint],
        registry: &mut EntityRegistry,
        npc_manager: &mut NpcManager,
        rooms: &RoomTable,
        sessions: &SessionTable,
    ) {
        let desired_by_point: HashMap<i64, &SpawnPoint> = desired
            .iter()
            .filter(|p| is_npc_like_kind(&p.kind))
            .filter(|p| {
                npc_manager
                    .prototype(&p.proto_id)
                    .map(|proto| !proto.is_resource())
                    .unwrap_or(false)
            })
            .map(|p| (p.id, p))
            .collect();

        let live: Vec<(EntityId, i64)> = registry
            .in_room(room_id)
            .into_iter()
            .filter(|e| e.kind == EntityKind::Npc)
            .filter_map(|e| e.spawn_point_id.map(|sid| (e.id, sid)))
            .collect();
        let live_points: HashSet<i64> = live.iter().map(|(_, sid)| *sid).collect();

        for (entity_id, spawn_point_id) in live {
            if desired_by_point.contains_key(&spawn_point_id) {
                continue;
            }
            npc_manager.despawn(entity_id);
            registry.remove_entity(entity_id);
            rooms.broadcast(room_id, sessions, ServerOpcode::EntityDespawn, serde_json::json!({ "id": entity_id.0 }));
        }

        for (point_id, point) in desired_by_point {
            if live_points.contains(&point_id) {
                continue;
            }
            self.spawn_shared_npc(point, room_id, registry, npc_manager, rooms, sessions);
        }
    }

    fn spawn_shared_npc(
        &self,
        point: &SpawnPoint,
        room_id: &RoomId,
        registry: &mut EntityRegistry,
        npc_manager: &mut NpcManager,
        rooms: &RoomTable,
        sessions: &SessionTable,
    ) {
        let entity_id = registry.create_npc_entity(room_id.clone(), point.proto_id.clone());
        if let Some(e) = registry.get_mut(entity_id) {
            e.prototype_id = Some(point.proto_id.clone());
            e.spawn_point_id = Some(point.id);
            e.spawn_id = Some(point.spawn_id.clone());
            e.region_id = Some(point.region_id.clone());
            e.seed_spawn_home(Pose { x: point.x, y: point.y, z: point.z, rot_y: 0.0 });
            if let Some(proto) = npc_manager.prototype(&point.proto_id) {
                e.name = proto.display_name.clone();
                e.hp = proto.max_hp;
                e.max_hp = proto.max_hp;
            }
        }

        npc_manager.spawn(entity_id, &point.proto_id, room_id.clone());
        if let Some(rt) = npc_manager.runtime_mut(entity_id) {
            rt.template_id = point.proto_id.clone();
            rt.variant_id = point.variant_id.clone();
        }

        if let Some(snapshot) = registry.get(entity_id) {
            rooms.broadcast(room_id, sessions, ServerOpcode::EntitySpawn, entity_spawn_payload(snapshot));
        }
    }

    /// Reconciles `owner_session_id`'s personal resource nodes in
    /// `room_id`. Guarded by a per-`(room, session)` in-flight flag so a
    /// reentrant call (e.g. two join events racing) is a no-op rather than
    /// double-spawning.
    pub fn reconcile_personal(
        &mut self,
        room_id: &RoomId,
        owner_session_id: &SessionId,
        desired: &[SpawnPoint],
        registry: &mut EntityRegistry,
        npc_manager: &NpcManager,
        character: &Character,
        node_depletion: &(dyn NodeDepletionService + Send + Sync),
    ) {
        let key = (room_id.clone(), owner_session_id.clone());
        if self.personal_in_flight.contains(&key) {
            tracing::warn!(room = %room_id, session = %owner_session_id, "personal spawn reconciliation already in flight, skipping");
            return;
        }
        self.personal_in_flight.insert(key.clone());

        let desired_by_point: HashMap<i64, &SpawnPoint> = desired
            .iter()
            .filter(|p| {
                is_node_like_kind(&p.kind)
                    || npc_manager.prototype(&p.proto_id).map(|proto| proto.is_resource()).unwrap_or(false)
            })
            .filter(|p| node_depletion.is_node_available(character, p.id))
            .map(|p| (p.id, p))
            .collect();

        let live: Vec<(EntityId, i64)> = registry
            .in_room(room_id)
            .into_iter()
            .filter(|e| matches!(&e.owner, Owner::Session(s) if s == owner_session_id))
            .filter_map(|e| e.spawn_point_id.map(|sid| (e.id, sid)))
            .collect();
        let live_points: HashSet<i64> = live.iter().map(|(_, sid)| *sid).collect();

        for (entity_id, spawn_point_id) in live {
            if !desired_by_point.contains_key(&spawn_point_id) {
                registry.remove_entity(entity_id);
            }
        }

        for (point_id, point) in desired_by_point {
            if live_points.contains(&point_id) {
                continue;
            }
            let entity_id = registry.create_npc_entity(room_id.clone(), point.proto_id.clone());
            if let Some(e) = registry.get_mut(entity_id) {
                e.kind = EntityKind::Node;
                e.owner = Owner::Session(owner_session_id.clone());
                e.prototype_id = Some(point.proto_id.clone());
                e.spawn_point_id = Some(point.id);
                e.spawn_id = Some(point.spawn_id.clone());
                e.region_id = Some(point.region_id.clone());
                e.seed_spawn_home(Pose { x: point.x, y: point.y, z: point.z, rot_y: 0.0 });
            }
            // invariant: a personal node must never end up kind=player.
            if registry.get(entity_id).map(|e| e.kind) == Some(EntityKind::Player) {
                tracing::error!(entity = %entity_id, "personal node spawn produced a player-typed entity, removing");
                registry.remove_entity(entity_id);
            }
        }

        self.personal_in_flight.remove(&key);
    }
}
