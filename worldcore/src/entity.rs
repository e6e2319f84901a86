//! The `Entity` data model (§3). A tagged-variant struct, not a duck-typed
//! bag: every optional field is meaningful only for certain `EntityKind`s,
//! but lives on one struct rather than a per-kind type, because registries,
//! the combat pipeline, and the spawn controller all need to treat
//! `Entity` uniformly regardless of kind.

use crate::combat::status::StatusEffectStore;
use crate::ids::{EntityId, RoomId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Npc,
    /// A resource node (ore vein, herb patch, ...).
    Node,
    Pet,
    Object,
    Mailbox,
}

/// Owner of an entity. Players and personal resource nodes are owned by a
/// session; pets are owned by another entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    Session(crate::ids::SessionId),
    Entity(EntityId),
    None,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rot_y: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceFlags {
    pub invulnerable: bool,
    pub is_service_provider: bool,
}

#[derive(Clone, Debug)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub room_id: RoomId,
    pub owner: Owner,

    pub pose: Pose,
    /// Set at creation, never mutated by movement.
    pub spawn_home: Pose,

    pub hp: i64,
    pub max_hp: i64,
    pub alive: bool,

    pub name: String,
    pub model: String,

    pub prototype_id: Option<String>,
    pub spawn_point_id: Option<i64>,
    pub region_id: Option<String>,
    pub spawn_id: Option<String>,

    pub service: ServiceFlags,

    /// Active status effects. Lives on the entity, not a side table, so
    /// removal of the entity removes its effects for free.
    pub status: StatusEffectStore,
}

impl Entity {
    pub fn new_player(id: EntityId, room_id: RoomId, owner: crate::ids::SessionId) -> Self {
        Self {
            id,
            kind: EntityKind::Player,
            room_id,
            owner: Owner::Session(owner),
            pose: Pose::default(),
            spawn_home: Pose::default(),
            hp: 100,
            max_hp: 100,
            alive: true,
            name: String::new(),
            model: String::new(),
            prototype_id: None,
            spawn_point_id: None,
            region_id: None,
            spawn_id: None,
            service: ServiceFlags::default(),
            status: StatusEffectStore::default(),
        }
    }

    pub fn new_npc(id: EntityId, room_id: RoomId, model: impl Into<String>) -> Self {
        Self {
            id,
            kind: EntityKind::Npc,
            room_id,
            owner: Owner::None,
            pose: Pose::default(),
            spawn_home: Pose::default(),
            hp: 1,
            max_hp: 1,
            alive: true,
            name: String::new(),
            model: model.into(),
            prototype_id: None,
            spawn_point_id: None,
            region_id: None,
            spawn_id: None,
            service: ServiceFlags::default(),
            status: StatusEffectStore::default(),
        }
    }

    pub fn new_pet(id: EntityId, room_id: RoomId, model: impl Into<String>, owner: EntityId) -> Self {
        Self {
            id,
            kind: EntityKind::Pet,
            room_id,
            owner: Owner::Entity(owner),
            pose: Pose::default(),
            spawn_home: Pose::default(),
            hp: 1,
            max_hp: 1,
            alive: true,
            name: String::new(),
            model: model.into(),
            prototype_id: None,
            spawn_point_id: None,
            region_id: None,
            spawn_id: None,
            service: ServiceFlags::default(),
            status: StatusEffectStore::default(),
        }
    }

    /// Set `pose` and `spawn_home` together. Only valid immediately after
    /// creation; later callers should use `set_pose` alone.
    pub fn seed_spawn_home(&mut self, pose: Pose) {
        self.pose = pose;
        self.spawn_home = pose;
    }

    pub fn distance_from_spawn_xz(&self) -> f64 {
        let dx = self.pose.x - self.spawn_home.x;
        let dz = self.pose.z - self.spawn_home.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn distance_xz(&self, other: &Entity) -> f64 {
        let dx = self.pose.x - other.pose.x;
        let dz = self.pose.z - other.pose.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn is_resource_prototype(&self) -> bool {
        self.kind == EntityKind::Node
            || matches!(&self.prototype_id, Some(p) if p.starts_with("node:") || p.starts_with("resource:"))
    }
}
