//! Spawn lifecycle (§4.6): reconciling the external spawn-point catalog
//! against live entities. `SpawnController` handles the reconciliation;
//! `point` holds the catalog row shape and its classification helpers.

pub mod controller;
pub mod point;

pub use controller::SpawnController;
pub use point::{is_node_like_kind, is_npc_like_kind, spawn_authority, SpawnAuthority, SpawnPoint};
