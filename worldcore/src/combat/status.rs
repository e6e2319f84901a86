//! Status effects (§4.5.4): per-entity store of active effects with
//! stacking policies, expiry, HOT/DOT descriptors, and absorb buckets.
//! Lives on the entity it affects — no back-pointer to a source (Design
//! Notes keeps this out of the cyclic-reference trap).

use std::collections::HashMap;

use crate::clock::Millis;
use crate::ids::EntityId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Spell,
    Ability,
    Item,
    Environment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DamageSchool {
    Physical,
    Fire,
    Frost,
    Nature,
    Arcane,
    Shadow,
    Holy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackingPolicy {
    LegacyAdd,
    Refresh,
    Overwrite,
    DenyIfPresent,
    StackAdd,
    VersionedByApplier,
}

#[derive(Clone, Debug)]
pub struct HotDescriptor {
    pub tick_interval_ms: Millis,
    pub per_tick_heal: i64,
    pub last_tick_at: Millis,
}

#[derive(Clone, Debug)]
pub struct DotDescriptor {
    pub tick_interval_ms: Millis,
    pub per_tick_damage: i64,
    pub school: DamageSchool,
    pub last_tick_at: Millis,
}

#[derive(Clone, Debug)]
pub struct AbsorbBucket {
    pub remaining: i64,
    pub priority: i32,
    /// Empty set matches all schools.
    pub schools: Vec<DamageSchool>,
}

impl AbsorbBucket {
    fn matches(&self, school: Option<DamageSchool>) -> bool {
        self.schools.is_empty() || school.map(|s| self.schools.contains(&s)).unwrap_or(false)
    }
}

/// Modifier bag. Only a handful of keys have defined meaning to the core
/// today (threat transfer); the map shape keeps room for content-driven
/// keys without a schema change.
pub type Modifiers = HashMap<String, f64>;

pub const MOD_THREAT_TRANSFER_TO: &str = "threatTransferToEntityId";
pub const MOD_THREAT_TRANSFER_PCT: &str = "threatTransferPct";

#[derive(Clone, Debug)]
pub struct StatusEffectInstance {
    pub id: u64,
    pub source_kind: SourceKind,
    pub source_id: String,
    pub applied_by_kind: SourceKind,
    pub applied_by_id: String,
    pub expires_at: Millis,
    pub tags: Vec<String>,
    pub modifiers: Modifiers,
    pub hot: Option<HotDescriptor>,
    pub dot: Option<DotDescriptor>,
    pub absorb: Option<AbsorbBucket>,
    pub stacking: StackingPolicy,
    pub stacks: u32,
    pub max_stacks: u32,
    /// Used by `versioned_by_applier` to key multiple simultaneous
    /// instances from different appliers.
    pub version_key: Option<String>,
}

impl StatusEffectInstance {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    fn stacking_group_key(&self) -> String {
        self.source_id.clone()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// `deny_if_present` rejection signal.
    AlreadyPresent,
}

/// One entity's active status effects.
#[derive(Clone, Debug, Default)]
pub struct StatusEffectStore {
    effects: Vec<StatusEffectInstance>,
    next_id: u64,
}

impl StatusEffectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Resolves the stacking policy against any existing instance sharing
    /// this effect's stacking group (`sourceId` by default).
    pub fn apply(&mut self, mut effect: StatusEffectInstance) -> ApplyOutcome {
        let group = effect.stacking_group_key();

        if effect.stacking == StackingPolicy::VersionedByApplier {
            let key = effect.version_key.clone().unwrap_or_default();
            self.effects.retain(|e| {
                !(e.stacking_group_key() == group
                    && e.applied_by_id == effect.applied_by_id
                    && e.version_key.as_deref() == Some(key.as_str()))
            });
            effect.id = self.alloc_id();
            self.effects.push(effect);
            return ApplyOutcome::Applied;
        }

        let existing_idx = self.effects.iter().position(|e| e.stacking_group_key() == group);

        match (effect.stacking, existing_idx) {
            (StackingPolicy::DenyIfPresent, Some(_)) => ApplyOutcome::AlreadyPresent,
            (StackingPolicy::DenyIfPresent, None) => {
                effect.id = self.alloc_id();
                self.effects.push(effect);
                ApplyOutcome::Applied
            }
            (StackingPolicy::Overwrite, Some(idx)) => {
                effect.id = self.effects[idx].id;
                self.effects[idx] = effect;
                ApplyOutcome::Applied
            }
            (StackingPolicy::Overwrite, None) => {
                effect.id = self.alloc_id();
                self.effects.push(effect);
                ApplyOutcome::Applied
            }
            (StackingPolicy::Refresh, Some(idx)) => {
                self.effects[idx].expires_at = effect.expires_at;
                ApplyOutcome::Applied
            }
            (StackingPolicy::Refresh, None) => {
                effect.id = self.alloc_id();
                effect.stacks = 1;
                self.effects.push(effect);
                ApplyOutcome::Applied
            }
            (StackingPolicy::LegacyAdd, Some(idx)) => {
                let existing = &mut self.effects[idx];
                existing.stacks = (existing.stacks + 1).min(effect.max_stacks.max(1));
                existing.expires_at = existing.expires_at.max(effect.expires_at);
                ApplyOutcome::Applied
            }
            (StackingPolicy::LegacyAdd, None) => {
                effect.id = self.alloc_id();
                effect.stacks = 1;
                self.effects.push(effect);
                ApplyOutcome::Applied
            }
            (StackingPolicy::StackAdd, Some(idx)) => {
                let existing = &mut self.effects[idx];
                existing.stacks = (existing.stacks + 1).min(effect.max_stacks.max(1));
                existing.expires_at = effect.expires_at;
                ApplyOutcome::Applied
            }
            (StackingPolicy::StackAdd, None) => {
                effect.id = self.alloc_id();
                effect.stacks = 1;
                self.effects.push(effect);
                ApplyOutcome::Applied
            }
            (StackingPolicy::VersionedByApplier, _) => unreachable!("handled above"),
        }
    }

    pub fn active(&self, now: Millis) -> Vec<&StatusEffectInstance> {
        self.effects.iter().filter(|e| e.expires_at > now).collect()
    }

    pub fn clear_all(&mut self) {
        self.effects.clear();
    }

    pub fn clear_by_tags(&mut self, tags: &[&str]) {
        self.effects.retain(|e| !tags.iter().any(|t| e.has_tag(t)));
    }

    /// Removes effects tagged `break-on-damage` (mez/sleep/incap).
    pub fn break_crowd_control_on_damage(&mut self) {
        self.clear_by_tags(&["break-on-damage"]);
    }

    /// Consumes absorb buckets in descending priority order, filtered by
    /// matching school (an empty-schools bucket matches everything).
    /// Partial consumption decrements `remaining`; drained buckets are
    /// removed. Returns `(absorbed, remaining_damage)`.
    pub fn absorb_incoming_damage(&mut self, amount: i64, school: Option<DamageSchool>) -> (i64, i64) {
        if amount <= 0 {
            return (0, amount.max(0));
        }
        let mut indices: Vec<usize> = (0..self.effects.len())
            .filter(|&i| self.effects[i].absorb.as_ref().map(|b| b.matches(school)).unwrap_or(false))
            .collect();
        indices.sort_by_key(|&i| std::cmp::Reverse(self.effects[i].absorb.as_ref().unwrap().priority));

        let mut remaining_damage = amount;
        let mut absorbed_total = 0i64;
        let mut drained: Vec<usize> = Vec::new();

        for i in indices {
            if remaining_damage <= 0 {
                break;
            }
            let bucket = self.effects[i].absorb.as_mut().unwrap();
            let take = remaining_damage.min(bucket.remaining);
            bucket.remaining -= take;
            remaining_damage -= take;
            absorbed_total += take;
            if bucket.remaining <= 0 {
                drained.push(i);
            }
        }

        drained.sort_unstable_by(|a, b| b.cmp(a));
        for i in drained {
            self.effects.remove(i);
        }

        (absorbed_total, remaining_damage)
    }

    pub fn threat_transfer_effects(&self, now: Millis) -> Vec<crate::npc::threat::ThreatTransferEffect> {
        self.active(now)
            .into_iter()
            .filter_map(|e| {
                let redirect = e.modifiers.get(MOD_THREAT_TRANSFER_TO)?;
                let pct = e.modifiers.get(MOD_THREAT_TRANSFER_PCT)?;
                Some(crate::npc::threat::ThreatTransferEffect {
                    redirect_to: crate::ids::EntityId(*redirect as u64),
                    pct: *pct,
                })
            })
            .collect()
    }

    pub fn hots_due(&mut self, now: Millis) -> Vec<(u64, i64)> {
        let mut due = Vec::new();
        for e in self.effects.iter_mut() {
            if e.expires_at <= now {
                continue;
            }
            if let Some(hot) = e.hot.as_mut() {
                if now.saturating_sub(hot.last_tick_at) >= hot.tick_interval_ms {
                    hot.last_tick_at = now;
                    due.push((e.id, hot.per_tick_heal));
                }
            }
        }
        due
    }

    pub fn dots_due(&mut self, now: Millis) -> Vec<(u64, i64, DamageSchool, String)> {
        let mut due = Vec::new();
        for e in self.effects.iter_mut() {
            if e.expires_at <= now {
                continue;
            }
            if let Some(dot) = e.dot.as_mut() {
                if now.saturating_sub(dot.last_tick_at) >= dot.tick_interval_ms {
                    dot.last_tick_at = now;
                    due.push((e.id, dot.per_tick_damage, dot.school, e.applied_by_id.clone()));
                }
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Actually removes effects whose `expires_at` has passed, as opposed
    /// to `active()`'s lazy filtering. The tick calls this once per entity
    /// per pass so long-lived stores don't accumulate dead instances.
    pub fn prune_expired(&mut self, now: Millis) {
        self.effects.retain(|e| e.expires_at > now);
    }
}

pub fn get_active_status_effects_for_entity(store: &StatusEffectStore, now: Millis) -> Vec<&StatusEffectInstance> {
    store.active(now)
}

pub fn clear_all_status_effects_from_entity(store: &mut StatusEffectStore) {
    store.clear_all();
}

pub fn clear_entity_status_effects_by_tags(store: &mut StatusEffectStore, tags: &[&str]) {
    store.clear_by_tags(tags);
}

pub fn break_crowd_control_on_damage(store: &mut StatusEffectStore) {
    store.break_crowd_control_on_damage();
}

pub fn absorb_incoming_damage_from_entity_status_effects(
    store: &mut StatusEffectStore,
    damage: i64,
    school: Option<DamageSchool>,
    _now: Millis,
) -> (i64, i64) {
    store.absorb_incoming_damage(damage, school)
}

fn new_instance(source_id: &str, expires_at: Millis, stacking: StackingPolicy) -> StatusEffectInstance {
    StatusEffectInstance {
        id: 0,
        source_kind: SourceKind::Spell,
        source_id: source_id.to_string(),
        applied_by_kind: SourceKind::Spell,
        applied_by_id: "caster".to_string(),
        expires_at,
        tags: vec![],
        modifiers: HashMap::new(),
        hot: None,
        dot: None,
        absorb: None,
        stacking,
        stacks: 0,
        max_stacks: 5,
        version_key: None,
    }
}

#[allow(dead_code)]
fn silence_unused(_: EntityId) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_is_idempotent_on_stack_count() {
        let mut store = StatusEffectStore::new();
        store.apply(new_instance("buff:a", 100, StackingPolicy::Refresh));
        store.apply(new_instance("buff:a", 200, StackingPolicy::Refresh));
        store.apply(new_instance("buff:a", 150, StackingPolicy::Refresh));
        assert_eq!(store.len(), 1);
        assert_eq!(store.active(0)[0].expires_at, 150);
    }

    #[test]
    fn legacy_add_clamps_stacks_and_extends_expiry() {
        let mut store = StatusEffectStore::new();
        for i in 0..10 {
            store.apply(StatusEffectInstance { max_stacks: 3, ..new_instance("dot:a", 100 + i, StackingPolicy::LegacyAdd) });
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.active(0)[0].stacks, 3);
    }

    #[test]
    fn deny_if_present_rejects_second_application() {
        let mut store = StatusEffectStore::new();
        assert_eq!(store.apply(new_instance("cc:sleep", 100, StackingPolicy::DenyIfPresent)), ApplyOutcome::Applied);
        assert_eq!(store.apply(new_instance("cc:sleep", 200, StackingPolicy::DenyIfPresent)), ApplyOutcome::AlreadyPresent);
    }

    #[test]
    fn versioned_by_applier_keeps_one_instance_per_applier() {
        let mut store = StatusEffectStore::new();
        let mut a = new_instance("dot:shared", 100, StackingPolicy::VersionedByApplier);
        a.applied_by_id = "caster-a".into();
        a.version_key = Some("v1".into());
        let mut b = a.clone();
        b.applied_by_id = "caster-b".into();
        store.apply(a.clone());
        store.apply(b);
        store.apply(a);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn absorb_consumes_priority_order_then_schools() {
        let mut store = StatusEffectStore::new();
        store.apply(StatusEffectInstance {
            absorb: Some(AbsorbBucket { remaining: 6, priority: 0, schools: vec![] }),
            ..new_instance("shield:physical", 1000, StackingPolicy::Overwrite)
        });
        store.apply(StatusEffectInstance {
            absorb: Some(AbsorbBucket { remaining: 5, priority: 10, schools: vec![DamageSchool::Fire] }),
            ..new_instance("shield:fire", 1000, StackingPolicy::Overwrite)
        });

        let (absorbed, remaining) = store.absorb_incoming_damage(4, Some(DamageSchool::Physical));
        assert_eq!(absorbed, 4);
        assert_eq!(remaining, 0);
        assert_eq!(store.len(), 2);

        let (absorbed2, remaining2) = store.absorb_incoming_damage(7, Some(DamageSchool::Fire));
        assert_eq!(absorbed2, 7);
        assert_eq!(remaining2, 0);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn break_on_damage_clears_cc_tagged_effects_only() {
        let mut store = StatusEffectStore::new();
        store.apply(StatusEffectInstance { tags: vec!["break-on-damage".into(), "mez".into()], ..new_instance("cc:mez", 1000, StackingPolicy::Overwrite) });
        store.apply(new_instance("buff:other", 1000, StackingPolicy::Overwrite));
        store.break_crowd_control_on_damage();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn hots_due_respects_tick_interval() {
        let mut store = StatusEffectStore::new();
        store.apply(StatusEffectInstance {
            hot: Some(HotDescriptor { tick_interval_ms: 1000, per_tick_heal: 5, last_tick_at: 0 }),
            ..new_instance("hot:a", 10_000, StackingPolicy::Overwrite)
        });
        assert!(store.hots_due(500).is_empty());
        assert_eq!(store.hots_due(1000).len(), 1);
        assert!(store.hots_due(1500).is_empty());
    }
}
