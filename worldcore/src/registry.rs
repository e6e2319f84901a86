//! `EntityRegistry` (§4.2): the single owner of all `Entity` records,
//! keyed by `EntityId`. Secondary lookups (`by_owner`, `in_room`) are plain
//! O(N) scans over the map, same tradeoff the teacher accepts in its own
//! query layer — acceptable at this scale, and kept simple rather than
//! maintaining a second index that could drift out of sync.

use std::collections::HashMap;

use crate::entity::{Entity, EntityKind, Owner, Pose};
use crate::ids::{EntityId, RoomId, SessionId};

#[derive(Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Entity>,
    next_id: u64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self { entities: HashMap::new(), next_id: 1 }
    }

    fn alloc_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Idempotent per session: if the session already owns a player
    /// entity, rebind it in place (rewrite kind back to `player`, re-own
    /// the session, clear any spawn-point/prototype fields a stray
    /// reconciliation might have left behind) instead of creating a
    /// second one. Invariant: at most one player entity per session.
    pub fn create_player_for_session(&mut self, session_id: &SessionId, room_id: RoomId) -> EntityId {
        if let Some(existing) = self.find_player_owned_by(session_id) {
            let e = self.entities.get_mut(&existing).expect("existing id must resolve");
            e.kind = EntityKind::Player;
            e.owner = Owner::Session(session_id.clone());
            e.room_id = room_id;
            e.prototype_id = None;
            e.spawn_point_id = None;
            e.spawn_id = None;
            return existing;
        }
        let id = self.alloc_id();
        let entity = Entity::new_player(id, room_id, session_id.clone());
        self.entities.insert(id, entity);
        id
    }

    fn find_player_owned_by(&self, session_id: &SessionId) -> Option<EntityId> {
        self.entities.values().find(|e| {
            e.kind == EntityKind::Player && matches!(&e.owner, Owner::Session(s) if s == session_id)
        }).map(|e| e.id)
    }

    pub fn create_npc_entity(&mut self, room_id: RoomId, model: impl Into<String>) -> EntityId {
        let id = self.alloc_id();
        self.entities.insert(id, Entity::new_npc(id, room_id, model));
        id
    }

    pub fn create_pet(&mut self, room_id: RoomId, model: impl Into<String>, owner: EntityId) -> EntityId {
        let id = self.alloc_id();
        self.entities.insert(id, Entity::new_pet(id, room_id, model, owner));
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn by_owner(&self, session_id: &SessionId) -> Vec<&Entity> {
        self.entities.values().filter(|e| matches!(&e.owner, Owner::Session(s) if s == session_id)).collect()
    }

    pub fn in_room(&self, room_id: &RoomId) -> Vec<&Entity> {
        self.entities.values().filter(|e| &e.room_id == room_id).collect()
    }

    /// All entity ids of a given kind, in no particular order. Used by the
    /// tick's HOT/DOT pass, which must visit every live player and NPC
    /// regardless of room.
    pub fn ids_by_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.entities.values().filter(|e| e.kind == kind).map(|e| e.id).collect()
    }

    /// Mutable iterator over every entity, used by the tick's status-effect
    /// expiry pass (§2 "decay/expire status effects").
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn set_position(&mut self, id: EntityId, pose: Pose) -> bool {
        match self.entities.get_mut(&id) {
            Some(e) => {
                e.pose = pose;
                true
            }
            None => false,
        }
    }

    /// Does not broadcast; callers (RoomTable) are responsible for telling
    /// other sessions the entity is gone.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
