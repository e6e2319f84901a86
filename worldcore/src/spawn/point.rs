//! Spawn point data (§3, §4.6): re-exports the catalog row shape and adds
//! the classification helpers `SpawnController` applies to it.

use crate::external::CatalogSpawnPoint;

pub type SpawnPoint = CatalogSpawnPoint;

/// Which subsystem created a spawn point row, read off the `spawnId`
/// prefix. Informational only today — reconciliation doesn't branch on it
/// beyond the kind/prototype classification below.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnAuthority {
    Anchor,
    Seed,
    Brain,
    Manual,
}

pub fn spawn_authority(spawn_id: &str) -> SpawnAuthority {
    if spawn_id.starts_with("anchor:") {
        SpawnAuthority::Anchor
    } else if spawn_id.starts_with("seed:") {
        SpawnAuthority::Seed
    } else if spawn_id.starts_with("brain:") {
        SpawnAuthority::Brain
    } else {
        SpawnAuthority::Manual
    }
}

const NPC_LIKE_KINDS: [&str; 3] = ["npc", "mob", "creature"];
const NODE_LIKE_KINDS: [&str; 2] = ["node", "resource"];

pub fn is_npc_like_kind(kind: &str) -> bool {
    NPC_LIKE_KINDS.contains(&kind)
}

pub fn is_node_like_kind(kind: &str) -> bool {
    NODE_LIKE_KINDS.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_id_prefix_selects_authority() {
        assert_eq!(spawn_authority("anchor:town-rats-3"), SpawnAuthority::Anchor);
        assert_eq!(spawn_authority("seed:forest-1"), SpawnAuthority::Seed);
        assert_eq!(spawn_authority("brain:patrol-a"), SpawnAuthority::Brain);
        assert_eq!(spawn_authority("wp-42"), SpawnAuthority::Manual);
    }

    #[test]
    fn kind_classification() {
        assert!(is_npc_like_kind("mob"));
        assert!(!is_npc_like_kind("node"));
        assert!(is_node_like_kind("resource"));
        assert!(!is_node_like_kind("npc"));
    }
}
