//! Decision dispatch (§4.4.8). `Brain` is the pluggable seam for NPC AI
//! content (scripted lines, boss mechanics, ...); `resolve_decision` applies
//! the fallback ladder the spec requires regardless of what a brain
//! returns. Execution of a resolved decision (mutating state, sending
//! messages) belongs to `manager.rs`, which owns the registry/room/combat
//! collaborators a handler needs.

use crate::clock::Millis;
use crate::ids::EntityId;
use crate::ids::RoomId;

use super::perception::NpcPerception;
use super::prototype::Behavior;

/// Brain decision kinds (Design Notes: tagged sum type, exhaustively
/// matched by dispatch).
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    AttackEntity { target: EntityId },
    Flee,
    Say { line: String },
    MoveToRoom { room: RoomId },
    Idle,
}

impl Decision {
    fn is_aggressive(&self) -> bool {
        matches!(self, Decision::AttackEntity { .. })
    }
}

/// Pluggable AI content seam. Swapping implementations (scripted boss
/// mechanics, a scripting-language hook, ...) never touches the fallback
/// ladder below.
pub trait Brain: Send + Sync {
    fn decide(&self, perception: &NpcPerception, dt_ms: Millis) -> Option<Decision>;
}

/// Below this hp fraction a coward with a live target flees instead of
/// attacking.
pub const COWARD_FLEE_HP_FRACTION: f64 = 0.3;

/// Minimal default brain: attacks its current threat target if hostile and
/// a target is already selected, otherwise idles. Most of the interesting
/// behavior for aggressive/guard NPCs comes from the fallback ladder in
/// `resolve_decision`, which runs regardless of what the brain says. A
/// coward below the flee threshold runs instead of swinging back.
pub struct DefaultBrain;

impl Brain for DefaultBrain {
    fn decide(&self, perception: &NpcPerception, _dt_ms: Millis) -> Option<Decision> {
        if !perception.alive {
            return None;
        }
        if perception.behavior == Behavior::Coward
            && perception.current_target.is_some()
            && perception.max_hp > 0
            && (perception.hp as f64 / perception.max_hp as f64) <= COWARD_FLEE_HP_FRACTION
        {
            return Some(Decision::Flee);
        }
        if perception.hostile {
            if let Some(target) = perception.current_target {
                return Some(Decision::AttackEntity { target });
            }
        }
        Some(Decision::Idle)
    }
}

pub const FALLBACK_ATTACK_COOLDOWN_MS: Millis = 800;

/// Applies the §4.4.8 fallback ladder on top of whatever the brain
/// returned:
///
/// - If the brain returned `None` or a non-aggressive decision, the NPC's
///   behavior is aggressive/guard, and there is a present-in-room threat
///   leader, synthesize `attack_entity` (subject to the 800ms cooldown).
/// - Guard-specific: if any player in the room has severe recent crime,
///   attack them regardless of what else was decided.
pub fn resolve_decision(
    brain_decision: Option<Decision>,
    perception: &NpcPerception,
    now: Millis,
    last_fallback_attack_at: Option<Millis>,
) -> (Option<Decision>, Option<Millis>) {
    if perception.behavior == Behavior::Guard {
        if let Some(criminal) = perception.players_in_room.iter().find(|p| p.has_severe_recent_crime) {
            return (Some(Decision::AttackEntity { target: criminal.entity_id }), last_fallback_attack_at);
        }
    }

    let needs_fallback = match &brain_decision {
        None => true,
        Some(d) => !d.is_aggressive(),
    };

    if needs_fallback
        && matches!(perception.behavior, Behavior::Aggressive | Behavior::Guard)
        && perception.current_target.is_some()
    {
        let cooldown_elapsed = last_fallback_attack_at
            .map(|t| now.saturating_sub(t) >= FALLBACK_ATTACK_COOLDOWN_MS)
            .unwrap_or(true);
        if cooldown_elapsed {
            let target = perception.current_target.unwrap();
            return (Some(Decision::AttackEntity { target }), Some(now));
        }
    }

    (brain_decision, last_fallback_attack_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::prototype::GuardProfile;
    use crate::npc::threat::CombatRole;

    fn perception(behavior: Behavior, target: Option<EntityId>) -> NpcPerception {
        NpcPerception {
            self_id: EntityId(1),
            room_id: RoomId::world("s", 0, 0),
            hp: 10,
            max_hp: 10,
            alive: true,
            behavior,
            guard: GuardProfile::default(),
            room_is_safe_hub: false,
            hostile: matches!(behavior, Behavior::Aggressive | Behavior::Guard),
            players_in_room: vec![],
            current_target: target,
            last_aggro_at: None,
            last_attacker_entity_id: None,
        }
    }

    #[test]
    fn synthesizes_attack_when_brain_returns_idle_with_a_target() {
        let p = perception(Behavior::Aggressive, Some(EntityId(2)));
        let (decision, stamp) = resolve_decision(Some(Decision::Idle), &p, 1000, None);
        assert_eq!(decision, Some(Decision::AttackEntity { target: EntityId(2) }));
        assert_eq!(stamp, Some(1000));
    }

    #[test]
    fn fallback_respects_cooldown() {
        let p = perception(Behavior::Aggressive, Some(EntityId(2)));
        let (decision, stamp) = resolve_decision(Some(Decision::Idle), &p, 1000, Some(900));
        assert_eq!(decision, Some(Decision::Idle));
        assert_eq!(stamp, Some(900));
    }

    #[test]
    fn guard_fallback_overrides_everything_for_severe_crime() {
        let mut p = perception(Behavior::Guard, None);
        p.players_in_room.push(super::super::perception::PlayerSnapshot {
            entity_id: EntityId(5),
            session_id: crate::ids::SessionId("s1".into()),
            hp: 100,
            max_hp: 100,
            combat_role: CombatRole::Other,
            has_severe_recent_crime: true,
            has_minor_recent_crime: false,
        });
        let (decision, _) = resolve_decision(Some(Decision::Idle), &p, 0, None);
        assert_eq!(decision, Some(Decision::AttackEntity { target: EntityId(5) }));
    }

    #[test]
    fn non_hostile_behavior_never_gets_fallback_attack() {
        let p = perception(Behavior::Passive, None);
        let (decision, _) = resolve_decision(None, &p, 0, None);
        assert_eq!(decision, None);
    }
}
