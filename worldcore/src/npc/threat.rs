//! Threat table (§4.4.2). All operations here are pure on the value they
//! mutate — no I/O, no clock reads beyond the `now` passed in — so they're
//! exercised directly in tests without a running tick loop.

use std::collections::HashMap;

use crate::clock::Millis;
use crate::error::EngageError;
use crate::ids::EntityId;

use super::runtime::NpcRuntime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CombatRole {
    Tank,
    Dps,
    Healer,
    Other,
}

impl CombatRole {
    /// Tanks decay slower: a smaller fraction of remaining threat is
    /// removed per decay tick.
    fn decay_factor(self) -> f64 {
        match self {
            CombatRole::Tank => 0.02,
            CombatRole::Healer => 0.06,
            CombatRole::Dps | CombatRole::Other => 0.05,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ThreatState {
    entries: HashMap<EntityId, f64>,
    pub forced_target_entity_id: Option<EntityId>,
    pub forced_until: Option<Millis>,
    pub last_taunt_at: Option<Millis>,
}

impl ThreatState {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntityId) -> f64 {
        self.entries.get(&id).copied().unwrap_or(0.0)
    }

    pub fn remove(&mut self, id: EntityId) {
        self.entries.remove(&id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.forced_target_entity_id = None;
        self.forced_until = None;
    }

    pub fn top(&self) -> Option<(EntityId, f64)> {
        self.entries
            .iter()
            .max_by(|(ida, va), (idb, vb)| {
                // Tie-break by lexicographic id: smaller id wins, so flip the
                // id comparison relative to max_by's "greatest wins" semantics.
                va.partial_cmp(vb).unwrap_or(std::cmp::Ordering::Equal).then_with(|| idb.cmp(ida))
            })
            .map(|(id, v)| (*id, *v))
    }

    fn add(&mut self, id: EntityId, delta: f64) {
        *self.entries.entry(id).or_insert(0.0) += delta;
    }
}

/// Adds `max(1, amount)` threat from `attacker_id`, sets `last_attacker` and
/// `last_aggro_at`.
pub fn update_threat_from_damage(npc: &mut NpcRuntime, attacker_id: EntityId, amount: f64, now: Millis) {
    let credited = amount.max(1.0);
    npc.threat.add(attacker_id, credited);
    npc.last_attacker_entity_id = Some(attacker_id);
    npc.last_aggro_at = Some(now);
}

/// Adds threat without necessarily rewriting `last_attacker` (used by
/// healing-to-threat and threat transfer).
pub fn add_threat_value(
    npc: &mut NpcRuntime,
    id: EntityId,
    delta: f64,
    now: Millis,
    set_last_attacker: Option<EntityId>,
) {
    npc.threat.add(id, delta);
    if let Some(attacker) = set_last_attacker {
        npc.last_attacker_entity_id = Some(attacker);
        npc.last_aggro_at = Some(now);
    }
}

/// Sets forced target + boosts threat. Taunt immunity: within
/// `immunity_ms` of a prior taunt from a *different* taunter, the new
/// forced-target is rejected (a repeat taunt from the same taunter is
/// always allowed). Returns whether the taunt took effect.
pub fn apply_taunt(
    npc: &mut NpcRuntime,
    taunter_id: EntityId,
    duration_ms: Millis,
    threat_boost: f64,
    now: Millis,
    immunity_ms: Millis,
) -> bool {
    if let (Some(current), Some(last_taunt)) = (npc.threat.forced_target_entity_id, npc.threat.last_taunt_at) {
        if current != taunter_id && now.saturating_sub(last_taunt) < immunity_ms {
            return false;
        }
    }
    npc.threat.forced_target_entity_id = Some(taunter_id);
    npc.threat.forced_until = Some(now + duration_ms);
    npc.threat.last_taunt_at = Some(now);
    npc.threat.add(taunter_id, threat_boost);
    true
}

/// Deterministic decay. Idempotent between calls at the same `now`: callers
/// must not invoke this twice for the same tick. `validate_target` returns
/// `Ok(())` for a live, in-room, untargetable-by-nothing entry; `Err` gives
/// the reason, used to decide removal vs. faster decay.
pub fn decay_threat(
    npc: &mut NpcRuntime,
    now: Millis,
    get_role: &dyn Fn(EntityId) -> CombatRole,
    validate_target: &dyn Fn(EntityId) -> Result<(), EngageError>,
) {
    if let Some(until) = npc.threat.forced_until {
        if now >= until {
            npc.threat.forced_target_entity_id = None;
            npc.threat.forced_until = None;
        }
    }

    let ids: Vec<EntityId> = npc.threat.entries.keys().copied().collect();
    for id in ids {
        match validate_target(id) {
            Err(EngageError::Dead) | Err(EngageError::Stealth) | Err(EngageError::Protected) => {
                npc.threat.remove(id);
                continue;
            }
            Err(EngageError::OutOfRoom) => {
                let current = npc.threat.get(id);
                let decayed = current * (1.0 - (get_role(id).decay_factor() * 2.0)).max(0.0);
                if decayed < 0.5 {
                    npc.threat.remove(id);
                } else {
                    npc.threat.entries.insert(id, decayed);
                }
            }
            Ok(()) => {
                let current = npc.threat.get(id);
                let decayed = current * (1.0 - get_role(id).decay_factor()).max(0.0);
                if decayed < 0.5 {
                    npc.threat.remove(id);
                } else {
                    npc.threat.entries.insert(id, decayed);
                }
            }
        }
    }
}

/// If a valid forced target is set, return it. Else the highest-threat
/// valid target, tie-broken by lexicographic (numeric) id. Prunes invalid
/// targets and clears an expired/invalid forced target as a side effect.
pub fn select_threat_target(
    npc: &mut NpcRuntime,
    now: Millis,
    validate_target: &dyn Fn(EntityId) -> Result<(), EngageError>,
) -> Option<EntityId> {
    if let (Some(forced), Some(until)) = (npc.threat.forced_target_entity_id, npc.threat.forced_until) {
        if now < until && validate_target(forced).is_ok() {
            return Some(forced);
        }
        npc.threat.forced_target_entity_id = None;
        npc.threat.forced_until = None;
    }

    let ids: Vec<EntityId> = npc.threat.entries.keys().copied().collect();
    for id in ids {
        if validate_target(id).is_err() {
            npc.threat.remove(id);
        }
    }

    npc.threat.top().map(|(id, _)| id)
}

pub fn get_threat_value(npc: &NpcRuntime, id: EntityId) -> f64 {
    npc.threat.get(id)
}

pub fn get_last_attacker(npc: &NpcRuntime) -> Option<EntityId> {
    npc.last_attacker_entity_id
}

pub fn get_top_threat_target(npc: &NpcRuntime) -> Option<EntityId> {
    npc.threat.top().map(|(id, _)| id)
}

/// A damage-modifying effect that redirects a share of incoming threat to
/// another entity (e.g. a tank's taunt-adjacent "misdirection").
#[derive(Clone, Copy, Debug)]
pub struct ThreatTransferEffect {
    pub redirect_to: EntityId,
    pub pct: f64,
}

/// Resolves which transfer effect applies (highest `pct`, tie-break by
/// lexicographic id) and returns the `(recipient, amount)` pairs: the
/// redirected share to `redirect_to` and the remainder to `original_attacker`.
pub fn resolve_threat_transfer(
    original_attacker: EntityId,
    amount: f64,
    effects: &[ThreatTransferEffect],
) -> Vec<(EntityId, f64)> {
    let Some(winner) = effects
        .iter()
        .max_by(|a, b| a.pct.partial_cmp(&b.pct).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.redirect_to.cmp(&a.redirect_to)))
    else {
        return vec![(original_attacker, amount)];
    };
    let pct = winner.pct.clamp(0.0, 1.0);
    vec![(winner.redirect_to, amount * pct), (original_attacker, amount * (1.0 - pct))]
}

/// Healing-to-threat: heal `amount` from `healer` to `healed` generates
/// `max(1, floor(amount * heal_mult))` threat onto any NPC in the room that
/// already has a threat bucket for either party. Never adds threat to
/// unengaged NPCs.
pub fn apply_healing_to_threat(
    npcs_in_room: &mut [&mut NpcRuntime],
    healer: EntityId,
    healed: EntityId,
    heal_amount: f64,
    heal_mult: f64,
    now: Millis,
) {
    let threat_gain = (heal_amount * heal_mult).floor().max(1.0);
    for npc in npcs_in_room.iter_mut() {
        let engaged_on_healer = npc.threat.get(healer) > 0.0;
        let engaged_on_healed = npc.threat.get(healed) > 0.0;
        if !engaged_on_healer && !engaged_on_healed {
            continue;
        }
        add_threat_value(npc, healer, threat_gain, now, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RoomId;

    fn npc() -> NpcRuntime {
        NpcRuntime::new(EntityId(1), "rat", RoomId::world("s", 0, 0))
    }

    fn always_valid(_id: EntityId) -> Result<(), EngageError> {
        Ok(())
    }

    #[test]
    fn update_threat_from_damage_floors_at_one() {
        let mut n = npc();
        update_threat_from_damage(&mut n, EntityId(2), 0.2, 100);
        assert_eq!(get_threat_value(&n, EntityId(2)), 1.0);
        assert_eq!(n.last_attacker_entity_id, Some(EntityId(2)));
        assert_eq!(n.last_aggro_at, Some(100));
    }

    #[test]
    fn taunt_immunity_blocks_different_taunter_within_window() {
        let mut n = npc();
        assert!(apply_taunt(&mut n, EntityId(2), 5000, 100.0, 0, 2000));
        assert!(!apply_taunt(&mut n, EntityId(3), 5000, 100.0, 500, 2000));
        // same taunter is always allowed
        assert!(apply_taunt(&mut n, EntityId(2), 5000, 100.0, 500, 2000));
    }

    #[test]
    fn select_target_prefers_valid_forced_target() {
        let mut n = npc();
        update_threat_from_damage(&mut n, EntityId(2), 50.0, 0);
        apply_taunt(&mut n, EntityId(3), 5000, 10.0, 0, 0);
        let chosen = select_threat_target(&mut n, 100, &always_valid);
        assert_eq!(chosen, Some(EntityId(3)));
    }

    #[test]
    fn select_target_falls_back_to_highest_threat_with_lex_tiebreak() {
        let mut n = npc();
        update_threat_from_damage(&mut n, EntityId(5), 10.0, 0);
        update_threat_from_damage(&mut n, EntityId(2), 10.0, 0);
        let chosen = select_threat_target(&mut n, 100, &always_valid);
        // tie on threat value: lowest id wins per the lexicographic tie-break
        assert_eq!(chosen, Some(EntityId(2)));
    }

    #[test]
    fn decay_removes_dead_or_stealthed_targets() {
        let mut n = npc();
        update_threat_from_damage(&mut n, EntityId(2), 50.0, 0);
        decay_threat(&mut n, 100, &|_| CombatRole::Dps, &|_| Err(EngageError::Dead));
        assert_eq!(get_threat_value(&n, EntityId(2)), 0.0);
    }

    #[test]
    fn decay_is_slower_for_tanks() {
        let mut tank = npc();
        let mut dps = npc();
        update_threat_from_damage(&mut tank, EntityId(2), 100.0, 0);
        update_threat_from_damage(&mut dps, EntityId(2), 100.0, 0);
        decay_threat(&mut tank, 100, &|_| CombatRole::Tank, &always_valid);
        decay_threat(&mut dps, 100, &|_| CombatRole::Dps, &always_valid);
        assert!(get_threat_value(&tank, EntityId(2)) > get_threat_value(&dps, EntityId(2)));
    }

    #[test]
    fn threat_transfer_splits_by_pct_with_tiebreak() {
        let effects = vec![
            ThreatTransferEffect { redirect_to: EntityId(9), pct: 0.5 },
            ThreatTransferEffect { redirect_to: EntityId(2), pct: 0.5 },
        ];
        let shares = resolve_threat_transfer(EntityId(1), 100.0, &effects);
        // tie on pct: lowest id wins the lexicographic tie-break
        assert!(shares.iter().any(|(id, amt)| *id == EntityId(2) && *amt == 50.0));
        assert!(shares.iter().any(|(id, amt)| *id == EntityId(1) && *amt == 50.0));
    }

    #[test]
    fn healing_to_threat_only_touches_engaged_npcs() {
        let mut engaged = npc();
        let mut unengaged = npc();
        update_threat_from_damage(&mut engaged, EntityId(10), 5.0, 0);
        let mut npcs: Vec<&mut NpcRuntime> = vec![&mut engaged, &mut unengaged];
        apply_healing_to_threat(&mut npcs, EntityId(20), EntityId(10), 10.0, 0.5, 50);
        assert!(get_threat_value(npcs[0], EntityId(20)) >= 5.0);
        assert_eq!(get_threat_value(npcs[1], EntityId(20)), 0.0);
    }
}
