//! Sanctuary recapture, guard sortie, and siege/pressure tracking (§4.4.7).
//!
//! The predicates here are pure; `manager.rs` does the per-tick scanning
//! (which rooms, which NPCs) and calls into these to decide what happens.

use std::collections::HashMap;

use crate::clock::Millis;
use crate::ids::RoomId;

use super::prototype::GuardProfile;

/// Hostile, non-guard NPC sitting inside a sanctuary room with no active
/// breach: disengage immediately, the tick stops here for that NPC.
pub fn should_recapture(hostile: bool, is_guard: bool, in_sanctuary: bool, has_breach: bool) -> bool {
    hostile && !is_guard && in_sanctuary && !has_breach
}

/// One candidate a guard's recapture sweep might pick up.
#[derive(Clone, Copy, Debug)]
pub struct SweepCandidate<'a> {
    pub room_id: &'a RoomId,
    pub targeting_player: bool,
    pub in_combat_or_recently_aggressive: bool,
}

/// Sweep range extends by `siege_bonus_tiles` under siege when `guard_sortie`
/// is enabled.
pub fn sweep_range_tiles(guard: &GuardProfile, under_siege: bool) -> u32 {
    if under_siege && guard.guard_sortie {
        guard.range_tiles + guard.siege_bonus_tiles
    } else {
        guard.range_tiles
    }
}

/// Picks the nearest eligible candidate within range for a guard's
/// recapture sweep. Under siege + `morale_proactive`, in-combat or
/// recently-aggressive NPCs also qualify; otherwise only NPCs actively
/// targeting a player do.
pub fn pick_recapture_target<'a>(
    guard_room: &RoomId,
    candidates: &[SweepCandidate<'a>],
    range_tiles: u32,
    under_siege: bool,
    morale_proactive: bool,
) -> Option<&'a RoomId> {
    candidates
        .iter()
        .filter(|c| {
            let eligible = c.targeting_player || (under_siege && morale_proactive && c.in_combat_or_recently_aggressive);
            eligible
        })
        .filter_map(|c| guard_room.chebyshev_distance(c.room_id).map(|d| (d, c.room_id)))
        .filter(|(d, _)| *d <= range_tiles)
        .min_by_key(|(d, _)| *d)
        .map(|(_, room)| room)
}

/// Threat seeded onto a recapture target when a guard responds.
pub const RECAPTURE_SEED_THREAT: f64 = 100.0;

/// Tracks town-sanctuary "pressure" per room: repeated hostile pressure
/// within a window crossing a threshold recommends opening a breach. A
/// cooldown prevents immediately re-flagging the same room.
#[derive(Default)]
pub struct SanctuaryPressure {
    hits: HashMap<RoomId, Vec<Millis>>,
    last_breach_recommended: HashMap<RoomId, Millis>,
}

impl SanctuaryPressure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one unit of pressure (a disengage event) against `room` and
    /// returns whether a breach should now be recommended.
    pub fn record_pressure(&mut self, room: &RoomId, now: Millis, window_ms: Millis, threshold: u32, cooldown_ms: Millis) -> bool {
        let hits = self.hits.entry(room.clone()).or_default();
        hits.push(now);
        hits.retain(|t| now.saturating_sub(*t) <= window_ms);

        if (hits.len() as u32) < threshold {
            return false;
        }
        if let Some(last) = self.last_breach_recommended.get(room) {
            if now.saturating_sub(*last) < cooldown_ms {
                return false;
            }
        }
        self.last_breach_recommended.insert(room.clone(), now);
        true
    }
}

/// Throttles the siege alarm broadcast (an `EventBus` side-channel event,
/// §2) so a prolonged siege doesn't spam it every tick.
#[derive(Default)]
pub struct SiegeAlarm {
    last_raised: HashMap<RoomId, Millis>,
}

impl SiegeAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_raise(&mut self, room: &RoomId, now: Millis, cooldown_ms: Millis) -> bool {
        if let Some(last) = self.last_raised.get(room) {
            if now.saturating_sub(*last) < cooldown_ms {
                return false;
            }
        }
        self.last_raised.insert(room.clone(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recapture_only_applies_to_hostile_non_guard_unbreached() {
        assert!(should_recapture(true, false, true, false));
        assert!(!should_recapture(true, true, true, false));
        assert!(!should_recapture(true, false, false, false));
        assert!(!should_recapture(true, false, true, true));
    }

    #[test]
    fn sweep_range_extends_under_siege_with_sortie() {
        let guard = GuardProfile {
            guard_recapture_sweep: true,
            guard_sortie: true,
            range_tiles: 5,
            siege_bonus_tiles: 3,
            call_radius: 0,
            morale_proactive: false,
        };
        assert_eq!(sweep_range_tiles(&guard, false), 5);
        assert_eq!(sweep_range_tiles(&guard, true), 8);
    }

    #[test]
    fn pressure_recommends_breach_once_threshold_crossed() {
        let mut pressure = SanctuaryPressure::new();
        let room = RoomId::world("s", 0, 0);
        for t in 0..11 {
            let recommend = pressure.record_pressure(&room, t * 100, 15_000, 12, 15_000);
            assert!(!recommend);
        }
        assert!(pressure.record_pressure(&room, 1100, 15_000, 12, 15_000));
    }

    #[test]
    fn pressure_cooldown_blocks_immediate_re_recommendation() {
        let mut pressure = SanctuaryPressure::new();
        let room = RoomId::world("s", 0, 0);
        for t in 0..12 {
            pressure.record_pressure(&room, t, 15_000, 12, 15_000);
        }
        assert!(!pressure.record_pressure(&room, 13, 15_000, 12, 15_000));
    }

    #[test]
    fn siege_alarm_respects_cooldown() {
        let mut alarm = SiegeAlarm::new();
        let room = RoomId::world("s", 0, 0);
        assert!(alarm.should_raise(&room, 0, 15_000));
        assert!(!alarm.should_raise(&room, 1000, 15_000));
        assert!(alarm.should_raise(&room, 16_000, 15_000));
    }
}
