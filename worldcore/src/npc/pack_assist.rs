//! Pack assist (§4.4.4): when a grouped, help-calling NPC is damaged, its
//! allies get a guaranteed threat bucket on the offender and, optionally,
//! snap into the offender's room.

use std::collections::HashMap;

use crate::clock::Millis;
use crate::config::Config;
use crate::error::EngageError;
use crate::ids::{EntityId, RoomId};

use super::engage::is_valid_combat_target;
use super::runtime::NpcRuntime;
use super::threat::add_threat_value;

/// Per-caller-per-offender and global-per-`(group, offender)` throttles.
/// A value of `0` in config means the corresponding throttle is off.
#[derive(Default)]
pub struct AssistThrottle {
    per_caller: HashMap<(EntityId, EntityId), Millis>,
    global_offender: HashMap<(String, EntityId), Millis>,
    /// `(ally, offender, target_room)` marks, expiring at TTL.
    marks: HashMap<(EntityId, EntityId), Millis>,
}

impl AssistThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether N (in group `group`) may call assist for offender
    /// `offender_id` right now. `explicit_pursuit_room` (e.g. gate-home)
    /// bypasses the global per-offender cooldown.
    pub fn should_call(
        &mut self,
        caller: EntityId,
        group: &str,
        offender: EntityId,
        now: Millis,
        cfg: &Config,
        explicit_pursuit_room: bool,
    ) -> bool {
        if cfg.assist_offender_window_ms > 0 {
            if let Some(last) = self.per_caller.get(&(caller, offender)) {
                if now.saturating_sub(*last) < cfg.assist_offender_window_ms {
                    return false;
                }
            }
        }
        if !explicit_pursuit_room && cfg.assist_call_cooldown_ms > 0 {
            if let Some(last) = self.global_offender.get(&(group.to_string(), offender)) {
                if now.saturating_sub(*last) < cfg.assist_call_cooldown_ms {
                    return false;
                }
            }
        }
        self.per_caller.insert((caller, offender), now);
        self.global_offender.insert((group.to_string(), offender), now);
        true
    }

    fn already_marked(&self, ally: EntityId, offender: EntityId, now: Millis, ttl_ms: Millis) -> bool {
        match self.marks.get(&(ally, offender)) {
            Some(marked_at) if ttl_ms > 0 => now.saturating_sub(*marked_at) < ttl_ms,
            Some(_) => true,
            None => false,
        }
    }

    fn record_mark(&mut self, ally: EntityId, offender: EntityId, now: Millis) {
        self.marks.insert((ally, offender), now);
    }
}

pub struct AllyCandidate<'a> {
    pub runtime: &'a mut NpcRuntime,
    pub valid_target: Result<(), EngageError>,
}

/// Sorts candidates by existing threat on the offender (descending), then
/// lexicographic (ascending numeric) id, and takes up to `max_allies`
/// (`0` meaning unlimited). Stealth always blocks a candidate regardless
/// of other validity.
pub fn select_assist_allies<'a>(
    candidates: Vec<AllyCandidate<'a>>,
    offender: EntityId,
    max_allies: usize,
) -> Vec<&'a mut NpcRuntime> {
    let mut eligible: Vec<AllyCandidate<'a>> = candidates
        .into_iter()
        .filter(|c| !matches!(c.valid_target, Err(EngageError::Stealth)) && c.valid_target.is_ok())
        .collect();

    eligible.sort_by(|a, b| {
        let ta = a.runtime.threat.get(offender);
        let tb = b.runtime.threat.get(offender);
        tb.partial_cmp(&ta)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.runtime.entity_id.cmp(&b.runtime.entity_id))
    });

    let take = if max_allies == 0 { eligible.len() } else { max_allies.min(eligible.len()) };
    eligible.into_iter().take(take).map(|c| c.runtime).collect()
}

/// Guarantees a threat bucket exists for `offender` on `ally`: seeds
/// `max(1, shareMin)` if the existing share is zero or below the
/// anti-jitter delta, else adds `max(shareMin, ceil(pct * caller_threat))`
/// clamped to `shareMax`.
pub fn seed_or_bump_ally_threat(
    ally: &mut NpcRuntime,
    offender: EntityId,
    caller_threat_on_offender: f64,
    now: Millis,
    cfg: &Config,
) {
    let existing = ally.threat.get(offender);
    if existing <= cfg.assist_min_threat_delta_to_bump {
        let seed = cfg.assist_threat_share_min.max(1.0);
        add_threat_value(ally, offender, seed, now, None);
        return;
    }
    let share = (cfg.assist_threat_share_pct * caller_threat_on_offender).ceil();
    let bounded = share.max(cfg.assist_threat_share_min).min(cfg.assist_threat_share_max);
    add_threat_value(ally, offender, bounded, now, None);
}

/// Runs the full procedure for one assist call: selects allies, seeds
/// threat, optionally snaps allies into the target room, and records the
/// pack mark so it isn't repeated until TTL expiry.
#[allow(clippy::too_many_arguments)]
pub fn call_pack_assist<'a>(
    throttle: &mut AssistThrottle,
    candidates: Vec<AllyCandidate<'a>>,
    offender: EntityId,
    offender_room: RoomId,
    caller_threat_on_offender: f64,
    now: Millis,
    cfg: &Config,
) -> Vec<EntityId> {
    let allies = select_assist_allies(candidates, offender, cfg.assist_max_allies_per_call);
    let mut notified = Vec::new();
    for ally in allies {
        if throttle.already_marked(ally.entity_id, offender, now, cfg.assist_mark_ttl_ms) {
            continue;
        }
        seed_or_bump_ally_threat(ally, offender, caller_threat_on_offender, now, cfg);
        if cfg.train.assist_snap_allies && !ally.has_moved_this_tick(now) {
            ally.room_id = offender_room.clone();
            ally.stamp_moved(now);
        }
        throttle.record_mark(ally.entity_id, offender, now);
        notified.push(ally.entity_id);
    }
    notified
}

pub fn validate_ally_target(
    now: Millis,
    ally: &crate::entity::Entity,
    offender: &crate::entity::Entity,
    ally_room_id: &RoomId,
    allow_cross_room: bool,
    offender_stealthed: bool,
) -> Result<(), EngageError> {
    is_valid_combat_target(&super::engage::CombatContext {
        now,
        attacker: ally,
        target: offender,
        attacker_room_id: ally_room_id,
        allow_cross_room,
        target_stealthed: offender_stealthed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RoomId;

    fn runtime(id: u64) -> NpcRuntime {
        NpcRuntime::new(EntityId(id), "rat", RoomId::world("s", 0, 0))
    }

    #[test]
    fn seeds_minimum_threat_when_none_existing() {
        let mut ally = runtime(1);
        let cfg = Config::default();
        seed_or_bump_ally_threat(&mut ally, EntityId(99), 40.0, 0, &cfg);
        assert_eq!(ally.threat.get(EntityId(99)), cfg.assist_threat_share_min.max(1.0));
    }

    #[test]
    fn bumps_clamped_between_min_and_max() {
        let mut ally = runtime(1);
        let mut cfg = Config::default();
        cfg.assist_min_threat_delta_to_bump = -1.0; // force "existing > delta" branch
        add_threat_value(&mut ally, EntityId(99), 5.0, 0, None);
        seed_or_bump_ally_threat(&mut ally, EntityId(99), 1000.0, 0, &cfg);
        assert!(ally.threat.get(EntityId(99)) <= 5.0 + cfg.assist_threat_share_max);
    }

    #[test]
    fn select_assist_allies_orders_by_threat_desc_then_id_asc() {
        let mut a = runtime(5);
        let mut b = runtime(2);
        add_threat_value(&mut a, EntityId(1), 10.0, 0, None);
        add_threat_value(&mut b, EntityId(1), 10.0, 0, None);
        let candidates = vec![
            AllyCandidate { runtime: &mut a, valid_target: Ok(()) },
            AllyCandidate { runtime: &mut b, valid_target: Ok(()) },
        ];
        let selected = select_assist_allies(candidates, EntityId(1), 0);
        assert_eq!(selected[0].entity_id, EntityId(2));
    }

    #[test]
    fn stealthed_ally_target_excluded_from_assist() {
        let mut a = runtime(1);
        let candidates = vec![AllyCandidate { runtime: &mut a, valid_target: Err(EngageError::Stealth) }];
        let selected = select_assist_allies(candidates, EntityId(9), 0);
        assert!(selected.is_empty());
    }

    #[test]
    fn per_caller_throttle_blocks_repeat_calls_within_window() {
        let mut throttle = AssistThrottle::new();
        let mut cfg = Config::default();
        cfg.assist_offender_window_ms = 1000;
        assert!(throttle.should_call(EntityId(1), "pack", EntityId(2), 0, &cfg, false));
        assert!(!throttle.should_call(EntityId(1), "pack", EntityId(2), 500, &cfg, false));
        assert!(throttle.should_call(EntityId(1), "pack", EntityId(2), 1500, &cfg, false));
    }
}
