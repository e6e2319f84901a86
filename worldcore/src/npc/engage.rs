//! Engage State Law (§4.4.3): the single predicate every attack, assist
//! call, and threat-validity check goes through. Centralizing it here
//! means pack assist, train pursuit, and the brain's `attack_entity`
//! handler can never disagree about what counts as a legal target.

use crate::clock::Millis;
use crate::entity::Entity;
use crate::error::EngageError;
use crate::ids::RoomId;

pub struct CombatContext<'a> {
    pub now: Millis,
    pub attacker: &'a Entity,
    pub target: &'a Entity,
    pub attacker_room_id: &'a RoomId,
    pub allow_cross_room: bool,
    pub target_stealthed: bool,
}

/// Stealth is always a hard block, even when cross-room assist is
/// allowed. Out-of-room fails unless `allow_cross_room` is set.
pub fn is_valid_combat_target(ctx: &CombatContext) -> Result<(), EngageError> {
    if ctx.target_stealthed {
        return Err(EngageError::Stealth);
    }
    if ctx.target.service.invulnerable {
        return Err(EngageError::Protected);
    }
    if !ctx.target.alive {
        return Err(EngageError::Dead);
    }
    if &ctx.target.room_id != ctx.attacker_room_id && !ctx.allow_cross_room {
        return Err(EngageError::OutOfRoom);
    }
    Ok(())
}
