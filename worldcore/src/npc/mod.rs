//! NPC AI and threat engine (§4.4): perception, threat accounting, taunt,
//! pack assist, train pursuit, fear, sanctuary/guard sortie, and brain
//! dispatch. The densest component in the core, split one file per concern
//! so each piece is testable in isolation; `manager.rs` orchestrates them
//! into the per-tick `update_all` pass.

pub mod brain;
pub mod engage;
pub mod fear;
pub mod manager;
pub mod pack_assist;
pub mod perception;
pub mod prototype;
pub mod runtime;
pub mod sanctuary;
pub mod threat;
pub mod train;
