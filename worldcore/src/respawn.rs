//! `RespawnService` (§4.8): chooses where a dead player comes back and
//! restores them there. Spawn-point selection is plain data-crunching
//! (kept separate from the persisting wrapper so it's trivial to test);
//! persistence goes through `CharacterStore` via the background worker,
//! the same fire-and-forget pattern `DeathPipeline` uses for its saves.

use std::sync::Arc;

use crate::character::Character;
use crate::external::{CatalogSpawnPoint, CharacterStore, SpawnPointService};
use crate::ids::SessionId;
use crate::worker::BackgroundWorker;

const GRAVEYARD_KIND: &str = "graveyard";
const SETTLEMENT_KINDS: [&str; 6] = ["town", "hub", "city", "outpost", "player_start", "safe_hub"];
const INELIGIBLE_VARIANTS: [&str; 2] = ["kos", "hostile"];
const NEAR_RADIUS: f64 = 500.0;

fn is_eligible_settlement(p: &CatalogSpawnPoint) -> bool {
    SETTLEMENT_KINDS.contains(&p.kind.as_str())
        && !p.variant_id.as_deref().map(|v| INELIGIBLE_VARIANTS.contains(&v)).unwrap_or(false)
}

fn dist_sq(p: &CatalogSpawnPoint, x: f64, z: f64) -> f64 {
    let dx = p.x - x;
    let dz = p.z - z;
    dx * dx + dz * dz
}

fn nearest<'a>(points: impl Iterator<Item = &'a CatalogSpawnPoint>, x: f64, z: f64) -> Option<&'a CatalogSpawnPoint> {
    points.fold(None, |best, p| match best {
        None => Some(p),
        Some(b) => Some(if dist_sq(p, x, z) < dist_sq(b, x, z) { p } else { b }),
    })
}

/// Picks the best point in `candidates` to bring a character back at
/// `(x, z)`: the nearest eligible settlement when it is strictly closer
/// than the nearest graveyard, otherwise the nearest graveyard, otherwise
/// the nearest point of any kind. `None` means no candidate exists at all.
pub fn select_spawn_point(candidates: &[CatalogSpawnPoint], x: f64, z: f64) -> Option<&CatalogSpawnPoint> {
    let graveyard = nearest(candidates.iter().filter(|p| p.kind == GRAVEYARD_KIND), x, z);
    let settlement = nearest(candidates.iter().filter(|p| is_eligible_settlement(p)), x, z);

    match (graveyard, settlement) {
        (Some(g), Some(s)) => Some(if dist_sq(s, x, z) < dist_sq(g, x, z) { s } else { g }),
        (Some(g), None) => Some(g),
        (None, Some(s)) => Some(s),
        (None, None) => nearest(candidates.iter(), x, z),
    }
}

pub struct RespawnService {
    character_store: Arc<dyn CharacterStore>,
    /// Region queried as the last fallback before giving up and healing
    /// the character in place. No catalog in this core ships a notion of
    /// "the" origin region, so it's configured at construction.
    origin_region_id: String,
}

impl RespawnService {
    pub fn new(character_store: Arc<dyn CharacterStore>, origin_region_id: impl Into<String>) -> Self {
        Self { character_store, origin_region_id: origin_region_id.into() }
    }

    /// Candidate spawn points, tried in order until one set is non-empty:
    /// the character's last region, a 500-unit radius around its death
    /// position, then the origin region. An empty result here means
    /// in-place full heal is the only option left.
    fn candidates(
        &self,
        character: &Character,
        shard_id: &str,
        spawn_points: &dyn SpawnPointService,
    ) -> Vec<CatalogSpawnPoint> {
        if let Some(region) = &character.last_region_id {
            let points = spawn_points.get_spawn_points_for_region(shard_id, region);
            if !points.is_empty() {
                return points;
            }
        }

        let near = spawn_points.get_spawn_points_near(shard_id, character.x, character.z, NEAR_RADIUS);
        if !near.is_empty() {
            return near;
        }

        spawn_points.get_spawn_points_for_region(shard_id, &self.origin_region_id)
    }

    /// Moves `character` to its respawn point (or heals in place if no
    /// candidate exists anywhere), heals it to full, and persists the
    /// result in the background. Never blocks the tick.
    pub fn respawn_player(
        &self,
        session_id: &SessionId,
        character: &mut Character,
        shard_id: &str,
        spawn_points: &dyn SpawnPointService,
        worker: &BackgroundWorker,
    ) {
        let candidates = self.candidates(character, shard_id, spawn_points);
        match select_spawn_point(&candidates, character.x, character.z) {
            Some(point) => {
                character.x = point.x;
                character.y = point.y;
                character.z = point.z;
                character.last_region_id = Some(point.region_id.clone());
            }
            None => {
                tracing::warn!(session = %session_id, "no respawn candidates found anywhere, healing in place");
            }
        }
        character.heal_to_full();

        let store = self.character_store.clone();
        let sid = session_id.clone();
        let snapshot = character.clone();
        worker.submit(Box::new(move || store.save(&sid, &snapshot)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::BackgroundWorker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn point(kind: &str, variant: Option<&str>, x: f64, z: f64) -> CatalogSpawnPoint {
        CatalogSpawnPoint {
            id: 1,
            spawn_id: "anchor:1".into(),
            shard_id: "s".into(),
            region_id: "r1".into(),
            kind: kind.into(),
            proto_id: "".into(),
            variant_id: variant.map(|v| v.to_string()),
            x,
            y: 0.0,
            z,
        }
    }

    #[test]
    fn prefers_strictly_closer_eligible_settlement_over_graveyard() {
        let candidates = vec![point("graveyard", None, 0.0, 0.0), point("town", None, 50.0, 50.0)];
        let chosen = select_spawn_point(&candidates, 100.0, 100.0).unwrap();
        assert_eq!(chosen.kind, "town");
    }

    #[test]
    fn falls_back_to_graveyard_when_settlement_is_ineligible() {
        let candidates = vec![point("graveyard", None, 0.0, 0.0), point("town", Some("kos"), 50.0, 50.0)];
        let chosen = select_spawn_point(&candidates, 100.0, 100.0).unwrap();
        assert_eq!(chosen.kind, "graveyard");
    }

    #[test]
    fn falls_back_to_nearest_of_any_kind_when_no_graveyard_or_settlement() {
        let candidates = vec![point("dungeon_entrance", None, 10.0, 0.0), point("dungeon_entrance", None, 1.0, 0.0)];
        let chosen = select_spawn_point(&candidates, 0.0, 0.0).unwrap();
        assert_eq!(chosen.x, 1.0);
    }

    #[test]
    fn no_candidates_returns_none() {
        assert!(select_spawn_point(&[], 0.0, 0.0).is_none());
    }

    struct FakeCharacterStore {
        saved: Mutex<Vec<Character>>,
    }

    impl CharacterStore for FakeCharacterStore {
        fn load(&self, _session_id: &SessionId) -> Option<Character> {
            None
        }
        fn save(&self, _session_id: &SessionId, character: &Character) {
            self.saved.lock().unwrap().push(character.clone());
        }
        fn grant_xp(&self, _session_id: &SessionId, _amount: u64) {}
    }

    struct FakeSpawnPoints {
        for_region: Vec<CatalogSpawnPoint>,
        near_calls: AtomicUsize,
    }

    impl SpawnPointService for FakeSpawnPoints {
        fn get_spawn_points_for_region(&self, _shard_id: &str, region_id: &str) -> Vec<CatalogSpawnPoint> {
            if region_id == "r1" { self.for_region.clone() } else { vec![] }
        }
        fn get_spawn_points_near(&self, _shard_id: &str, _x: f64, _z: f64, _radius: f64) -> Vec<CatalogSpawnPoint> {
            self.near_calls.fetch_add(1, Ordering::SeqCst);
            vec![]
        }
    }

    #[test]
    fn respawn_player_moves_character_to_chosen_point_and_heals() {
        let store = Arc::new(FakeCharacterStore { saved: Mutex::new(vec![]) });
        let service = RespawnService::new(store.clone(), "origin");
        let spawn_points = FakeSpawnPoints {
            for_region: vec![point("graveyard", None, 0.0, 0.0), point("town", None, 50.0, 50.0)],
            near_calls: AtomicUsize::new(0),
        };
        let worker = BackgroundWorker::spawn(8);

        let mut character = Character::new("Tester");
        character.last_region_id = Some("r1".into());
        character.x = 100.0;
        character.z = 100.0;
        character.hp = 1;

        service.respawn_player(&SessionId("sess-1".into()), &mut character, "s", &spawn_points, &worker);
        drop(worker); // joins the background thread, guaranteeing the save ran

        assert_eq!(character.x, 50.0);
        assert_eq!(character.z, 50.0);
        assert_eq!(character.last_region_id.as_deref(), Some("r1"));
        assert_eq!(character.hp, character.max_hp);
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn falls_through_to_near_then_origin_when_last_region_has_no_points() {
        let spawn_points = FakeSpawnPoints { for_region: vec![], near_calls: AtomicUsize::new(0) };
        let store = Arc::new(FakeCharacterStore { saved: Mutex::new(vec![]) });
        let service = RespawnService::new(store, "origin");
        let mut character = Character::new("Tester");
        character.last_region_id = Some("r1".into());

        let candidates = service.candidates(&character, "s", &spawn_points);
        assert!(candidates.is_empty());
        assert_eq!(spawn_points.near_calls.load(Ordering::SeqCst), 1);
    }
}
