//! Minimal stand-ins for the external collaborators `worldcore` calls out
//! to (`CharacterStore`, `ItemService`, `RegionFlagService`,
//! `SpawnPointService`). Persistence, loot tables, and the region-flag
//! backend are explicitly out of scope for this core (§1) — a real host
//! would back these with its database and world-editor catalog. This
//! binary only needs something that answers the trait, so these are
//! process-lifetime, in-memory implementations, not a production backend.

use std::collections::HashMap;
use std::sync::Mutex;

use worldcore::character::Character;
use worldcore::external::{
    CatalogSpawnPoint, CharacterStore, DeliveryOutcome, ItemService, NpcAggroMode, RegionFlagService, SpawnPointService,
};
use worldcore::ids::SessionId;

#[derive(Default)]
pub struct InMemoryCharacterStore {
    characters: Mutex<HashMap<SessionId, Character>>,
}

impl CharacterStore for InMemoryCharacterStore {
    fn load(&self, session_id: &SessionId) -> Option<Character> {
        self.characters.lock().unwrap().get(session_id).cloned()
    }

    fn save(&self, session_id: &SessionId, character: &Character) {
        self.characters.lock().unwrap().insert(session_id.clone(), character.clone());
    }

    fn grant_xp(&self, session_id: &SessionId, amount: u64) {
        if let Some(c) = self.characters.lock().unwrap().get_mut(session_id) {
            c.xp += amount;
        }
    }
}

/// Always delivers to bags; there is no bag-capacity model in this core.
pub struct AlwaysBagsItemService;

impl ItemService for AlwaysBagsItemService {
    fn deliver_item_to_bags_or_mail(&self, _session_id: &SessionId, _item_id: &str, _qty: u32) -> DeliveryOutcome {
        DeliveryOutcome::Bags
    }
}

/// No sanctuaries, no breaches, normal aggro everywhere. A host with a
/// real region catalog swaps this for one backed by `RegionFlagService`.
pub struct OpenWorldRegionFlags;

impl RegionFlagService for OpenWorldRegionFlags {
    fn npc_aggro_mode(&self, _region_id: &str) -> NpcAggroMode {
        NpcAggroMode::Normal
    }

    fn is_sanctuary(&self, _region_id: &str) -> bool {
        false
    }

    fn has_active_breach(&self, _region_id: &str) -> bool {
        false
    }
}

/// No spawn catalog wired up; `RespawnService` falls through to its
/// in-place full-heal fallback (§4.8) and `SpawnController` reconciles
/// against an empty desired set.
pub struct EmptySpawnCatalog;

impl SpawnPointService for EmptySpawnCatalog {
    fn get_spawn_points_for_region(&self, _shard_id: &str, _region_id: &str) -> Vec<CatalogSpawnPoint> {
        vec![]
    }

    fn get_spawn_points_near(&self, _shard_id: &str, _x: f64, _z: f64, _radius: f64) -> Vec<CatalogSpawnPoint> {
        vec![]
    }
}
