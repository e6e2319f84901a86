//! `RoomTable` (§4.3): membership, join/leave lifecycle, and the
//! visibility filter used when building `entity_list`.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::character::Character;
use crate::entity::{Entity, EntityKind, Owner, Pose};
use crate::ids::{RoomId, SessionId};
use crate::protocol::{ServerEnvelope, ServerOpcode};
use crate::registry::EntityRegistry;
use crate::session::SessionTable;

#[derive(Default)]
pub struct Room {
    pub members: HashSet<SessionId>,
}

#[derive(Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, Room>,
}

pub(crate) fn entity_spawn_payload(e: &Entity) -> serde_json::Value {
    json!({
        "id": e.id.0,
        "kind": format!("{:?}", e.kind),
        "name": e.name,
        "x": e.pose.x, "y": e.pose.y, "z": e.pose.z, "rotY": e.pose.rot_y,
        "hp": e.hp, "maxHp": e.max_hp, "alive": e.alive,
    })
}

impl RoomTable {
    pub fn new() -> Self {
        Self { rooms: HashMap::new() }
    }

    fn room_mut(&mut self, room_id: &RoomId) -> &mut Room {
        self.rooms.entry(room_id.clone()).or_default()
    }

    /// Other entities visible to `viewer_session`: always show other
    /// players; show shared (ownerless) entities; show personally-owned
    /// entities only to their owner.
    fn visible_to<'a>(
        entities: &'a [&'a Entity],
        viewer_session: &SessionId,
    ) -> Vec<&'a Entity> {
        entities
            .iter()
            .copied()
            .filter(|e| match (&e.kind, &e.owner) {
                (EntityKind::Player, _) => true,
                (_, Owner::None) => true,
                (_, Owner::Session(s)) => s == viewer_session,
                (_, Owner::Entity(_)) => true,
            })
            .collect()
    }

    /// Joins `session_id` to `room_id`. For world rooms: creates/rebinds
    /// the player entity, seeds pose from `character` if present, sends
    /// `entity_list` to the joiner, then broadcasts `entity_spawn` to
    /// everyone else already in the room.
    pub fn join(
        &mut self,
        session_id: &SessionId,
        room_id: &RoomId,
        registry: &mut EntityRegistry,
        sessions: &SessionTable,
        character: Option<&Character>,
    ) {
        self.room_mut(room_id).members.insert(session_id.clone());

        if !room_id.is_world() {
            return;
        }

        let entity_id = registry.create_player_for_session(session_id, room_id.clone());
        if let Some(ch) = character {
            if let Some(e) = registry.get_mut(entity_id) {
                e.name = ch.name.clone();
                e.seed_spawn_home(Pose { x: ch.x, y: ch.y, z: ch.z, rot_y: ch.rot_y });
            }
        }

        let self_entity = registry.get(entity_id).cloned();
        let others: Vec<Entity> = registry
            .in_room(room_id)
            .into_iter()
            .filter(|e| e.id != entity_id)
            .cloned()
            .collect();
        let refs: Vec<&Entity> = others.iter().collect();
        let visible = Self::visible_to(&refs, session_id);

        let mut listing: Vec<serde_json::Value> = Vec::new();
        if let Some(me) = &self_entity {
            listing.push(entity_spawn_payload(me));
        }
        listing.extend(visible.iter().map(|e| entity_spawn_payload(e)));

        sessions.send_to(
            session_id,
            &ServerEnvelope::new(ServerOpcode::EntityList, json!({ "entities": listing })),
        );

        if let Some(me) = &self_entity {
            self.broadcast_except(
                room_id,
                session_id,
                sessions,
                ServerOpcode::EntitySpawn,
                entity_spawn_payload(me),
            );
        }
    }

    /// Removes `session_id` from membership. For world rooms: despawns
    /// all personally-owned entities in the room (broadcasting despawn
    /// for each), then despawns the player entity and broadcasts despawn.
    pub fn leave(
        &mut self,
        session_id: &SessionId,
        room_id: &RoomId,
        registry: &mut EntityRegistry,
        sessions: &SessionTable,
    ) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.members.remove(session_id);
        }

        if !room_id.is_world() {
            return;
        }

        let owned_ids: Vec<_> = registry
            .in_room(room_id)
            .into_iter()
            .filter(|e| matches!(&e.owner, Owner::Session(s) if s == session_id) && e.kind != EntityKind::Player)
            .map(|e| e.id)
            .collect();
        for id in owned_ids {
            registry.remove_entity(id);
            self.broadcast(room_id, sessions, ServerOpcode::EntityDespawn, json!({ "id": id.0 }));
        }

        let player_id = registry
            .in_room(room_id)
            .into_iter()
            .find(|e| e.kind == EntityKind::Player && matches!(&e.owner, Owner::Session(s) if s == session_id))
            .map(|e| e.id);
        if let Some(id) = player_id {
            registry.remove_entity(id);
            self.broadcast(room_id, sessions, ServerOpcode::EntityDespawn, json!({ "id": id.0 }));
        }
    }

    pub fn broadcast(&self, room_id: &RoomId, sessions: &SessionTable, op: ServerOpcode, payload: serde_json::Value) {
        let Some(room) = self.rooms.get(room_id) else { return };
        let envelope = ServerEnvelope::new(op, payload);
        for member in &room.members {
            sessions.send_to(member, &envelope);
        }
    }

    pub fn broadcast_except(
        &self,
        room_id: &RoomId,
        excluded: &SessionId,
        sessions: &SessionTable,
        op: ServerOpcode,
        payload: serde_json::Value,
    ) {
        let Some(room) = self.rooms.get(room_id) else { return };
        let envelope = ServerEnvelope::new(op, payload);
        for member in &room.members {
            if member != excluded {
                sessions.send_to(member, &envelope);
            }
        }
    }

    pub fn members(&self, room_id: &RoomId) -> Vec<SessionId> {
        self.rooms.get(room_id).map(|r| r.members.iter().cloned().collect()).unwrap_or_default()
    }
}
