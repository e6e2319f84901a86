//! Fear flee (§4.4.6). Checked before target selection: a feared NPC
//! ignores its brain entirely for the tick.

use crate::entity::Entity;
use crate::ids::RoomId;

use super::runtime::NpcRuntime;

/// If any active status effect carries the `fear` tag, step one room tile
/// away from the anchor (top-threat target's room, else spawn room) and
/// signal the caller to skip all further decisions this tick.
pub fn apply_fear_flee(
    npc: &NpcRuntime,
    npc_entity: &mut Entity,
    has_fear_tag: bool,
    anchor_room: Option<&RoomId>,
) -> bool {
    if !has_fear_tag {
        return false;
    }
    let anchor = anchor_room.unwrap_or(&npc.spawn_room_id);
    npc_entity.room_id = npc_entity.room_id.step_away(anchor);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, Owner, Pose, ServiceFlags};
    use crate::ids::EntityId;

    fn entity(room: RoomId) -> Entity {
        Entity {
            id: EntityId(1),
            kind: EntityKind::Npc,
            room_id: room,
            owner: Owner::None,
            pose: Pose::default(),
            spawn_home: Pose::default(),
            hp: 10,
            max_hp: 10,
            alive: true,
            name: String::new(),
            model: String::new(),
            prototype_id: None,
            spawn_point_id: None,
            region_id: None,
            spawn_id: None,
            service: ServiceFlags::default(),
            status: crate::combat::status::StatusEffectStore::default(),
        }
    }

    #[test]
    fn fear_steps_away_from_anchor_and_signals_skip() {
        let home = RoomId::world("s", 0, 0);
        let npc = NpcRuntime::new(EntityId(1), "rat", home.clone());
        let mut npc_entity = entity(home);
        let anchor = RoomId::world("s", 1, 0);
        let skipped = apply_fear_flee(&npc, &mut npc_entity, true, Some(&anchor));
        assert!(skipped);
        assert_eq!(npc_entity.room_id, RoomId::world("s", -1, 0));
    }

    #[test]
    fn no_fear_tag_is_a_no_op() {
        let home = RoomId::world("s", 0, 0);
        let npc = NpcRuntime::new(EntityId(1), "rat", home.clone());
        let mut npc_entity = entity(home.clone());
        let skipped = apply_fear_flee(&npc, &mut npc_entity, false, None);
        assert!(!skipped);
        assert_eq!(npc_entity.room_id, home);
    }
}
