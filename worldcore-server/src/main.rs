//! Headless tick-loop binary that drives the `worldcore` simulation.
//!
//! This is the teacher's headless `server` binary generalized: no Bevy
//! `App`, no Lightyear transport, no fixed-update schedule graph — wire
//! framing and networking are out of scope for the core (§1), so this
//! binary's only job is to build a `Config` from the environment,
//! construct the `World` aggregate, and drive `World::tick` at the
//! configured interval, logging lifecycle events via `tracing`.

mod fixtures;

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use worldcore::config::{tick_duration, Config};
use worldcore::npc::prototype::{Behavior, NpcPrototype};
use worldcore::tick::World;

use fixtures::{AlwaysBagsItemService, EmptySpawnCatalog, InMemoryCharacterStore, OpenWorldRegionFlags};

const SHARD_ID: &str = "prime";
const ORIGIN_REGION_ID: &str = "origin";
const WORKER_QUEUE_CAPACITY: usize = 256;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cfg = Config::from_env();
    tracing::info!(tick_ms = cfg.tick_interval_ms, test_mode = cfg.test_mode, "worldcore starting");

    let character_store = Arc::new(InMemoryCharacterStore::default());
    let item_service = Arc::new(AlwaysBagsItemService);
    let region_flags = OpenWorldRegionFlags;
    let spawn_points = EmptySpawnCatalog;

    let mut world = World::new(SHARD_ID, ORIGIN_REGION_ID, cfg.clone(), character_store, item_service, WORKER_QUEUE_CAPACITY);
    register_demo_prototypes(&mut world);

    let interval = tick_duration(&cfg);
    let mut rng = StdRng::from_entropy();
    let mut sim_now: u64 = 0;

    tracing::info!(shard = SHARD_ID, "tick loop running");
    loop {
        thread::sleep(interval);
        sim_now += cfg.tick_interval_ms;
        world.tick(sim_now, &region_flags, &spawn_points, &mut rng);
    }
}

/// Registers a couple of representative prototypes so a freshly started
/// shard has something to simulate. A real host loads its full catalog
/// from the content pipeline before the first tick; this core has no
/// opinion on where that catalog lives (§1 — class/spell/content catalogs
/// are out of scope).
fn register_demo_prototypes(world: &mut World) {
    let mut rat = NpcPrototype::test_default("rat");
    rat.display_name = "a sewer rat".into();
    rat.max_hp = 20;
    rat.xp_reward = Some(8);
    rat.melee_damage_min = 1;
    rat.melee_damage_max = 3;
    world.npc_manager_mut().register_prototype(rat);

    let mut guard = NpcPrototype::test_default("town_guard");
    guard.display_name = "a town guard".into();
    guard.behavior = Behavior::Guard;
    guard.max_hp = 250;
    guard.melee_damage_min = 10;
    guard.melee_damage_max = 18;
    guard.guard.guard_recapture_sweep = true;
    guard.guard.guard_sortie = true;
    guard.guard.range_tiles = 2;
    guard.guard.siege_bonus_tiles = 1;
    world.npc_manager_mut().register_prototype(guard);
}
