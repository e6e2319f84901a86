//! Entity/session ids and the room-id coordinate helpers.
//!
//! Room ids are strings on the wire (`"<shard>:<x>,<y>"` for world rooms,
//! bare tokens like `"lobby"` for UI rooms) but are parsed into a typed
//! `RoomId` at the boundary so the rest of the core never does string
//! surgery to compare or step rooms.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Stable identifier for an `Entity`. Entities are keyed by value, never by
/// pointer, so lifetimes of threat tables / runtime state can be bounded by
/// simple map membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

impl EntityId {
    /// Inverse of the `Display` format. Status effects carry their
    /// applier as a free-form tag string (it may name a non-entity
    /// source); this resolves the `"entity:<n>"` shape back when there is
    /// one, and returns `None` otherwise rather than guessing.
    pub fn parse_tag(tag: &str) -> Option<EntityId> {
        tag.strip_prefix("entity:")?.parse::<u64>().ok().map(EntityId)
    }
}

/// Stable identifier for a `Session`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A room id. World rooms carry shard grid coordinates; non-world rooms
/// (lobby, auth, character select) carry only a bare token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomId {
    World { shard: String, x: i32, y: i32 },
    Bare(String),
}

impl RoomId {
    pub fn world(shard: impl Into<String>, x: i32, y: i32) -> Self {
        RoomId::World { shard: shard.into(), x, y }
    }

    pub fn bare(token: impl Into<String>) -> Self {
        RoomId::Bare(token.into())
    }

    pub fn is_world(&self) -> bool {
        matches!(self, RoomId::World { .. })
    }

    pub fn shard(&self) -> Option<&str> {
        match self {
            RoomId::World { shard, .. } => Some(shard.as_str()),
            RoomId::Bare(_) => None,
        }
    }

    /// Parse the on-wire room id format. A bare token (no top-level colon)
    /// parses to `RoomId::Bare`; `"<shard>:<x>,<y>"` parses to a world room.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let Some((shard, coords)) = raw.split_once(':') else {
            return Ok(RoomId::Bare(raw.to_string()));
        };
        let Some((xs, ys)) = coords.split_once(',') else {
            return Err(ConfigError::MalformedRoomId(raw.to_string()));
        };
        let x: i32 = xs.trim().parse().map_err(|_| ConfigError::MalformedRoomId(raw.to_string()))?;
        let y: i32 = ys.trim().parse().map_err(|_| ConfigError::MalformedRoomId(raw.to_string()))?;
        Ok(RoomId::World { shard: shard.to_string(), x, y })
    }

    pub fn format(&self) -> String {
        match self {
            RoomId::World { shard, x, y } => format!("{shard}:{x},{y}"),
            RoomId::Bare(token) => token.clone(),
        }
    }

    /// Chebyshev (grid) distance between two world rooms on the same
    /// shard. Rooms on different shards, or a non-world room on either
    /// side, have no defined distance.
    pub fn chebyshev_distance(&self, other: &RoomId) -> Option<u32> {
        match (self, other) {
            (
                RoomId::World { shard: s1, x: x1, y: y1 },
                RoomId::World { shard: s2, x: x2, y: y2 },
            ) if s1 == s2 => Some((x1 - x2).unsigned_abs().max((y1 - y2).unsigned_abs())),
            _ => None,
        }
    }

    /// One room step toward `target`, clamped to unit steps on each axis
    /// (no diagonal-biasing beyond what Chebyshev distance already
    /// implies). Returns `self` unchanged if not on the same shard, not a
    /// world room, or already at `target`.
    pub fn step_toward(&self, target: &RoomId) -> RoomId {
        let RoomId::World { shard, x, y } = self else { return self.clone() };
        let RoomId::World { shard: ts, x: tx, y: ty } = target else { return self.clone() };
        if shard != ts {
            return self.clone();
        }
        let nx = x + (tx - x).signum();
        let ny = y + (ty - y).signum();
        RoomId::World { shard: shard.clone(), x: nx, y: ny }
    }

    /// One room step directly away from `from`.
    pub fn step_away(&self, from: &RoomId) -> RoomId {
        let RoomId::World { shard, x, y } = self else { return self.clone() };
        let RoomId::World { shard: fs, x: fx, y: fy } = from else { return self.clone() };
        if shard != fs {
            return self.clone();
        }
        let nx = x + (x - fx).signum();
        let ny = y + (y - fy).signum();
        RoomId::World { shard: shard.clone(), x: nx, y: ny }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_world_room() {
        let r = RoomId::parse("prime_shard:2,-1").unwrap();
        assert_eq!(r, RoomId::world("prime_shard", 2, -1));
        assert_eq!(r.format(), "prime_shard:2,-1");
    }

    #[test]
    fn parses_bare_room() {
        let r = RoomId::parse("lobby").unwrap();
        assert_eq!(r, RoomId::bare("lobby"));
        assert!(!r.is_world());
    }

    #[test]
    fn rejects_malformed_world_room() {
        assert!(RoomId::parse("prime_shard:oops").is_err());
    }

    #[test]
    fn chebyshev_distance_is_grid_distance() {
        let a = RoomId::world("s", 0, 0);
        let b = RoomId::world("s", 3, 1);
        assert_eq!(a.chebyshev_distance(&b), Some(3));
    }

    #[test]
    fn step_toward_moves_one_room_each_axis() {
        let a = RoomId::world("s", 0, 0);
        let b = RoomId::world("s", 2, 0);
        let stepped = a.step_toward(&b);
        assert_eq!(stepped, RoomId::world("s", 1, 0));
        // moving a room to its current room is a no-op
        assert_eq!(a.step_toward(&a), a);
    }

    #[test]
    fn parse_tag_round_trips_display_and_rejects_garbage() {
        let id = EntityId(42);
        assert_eq!(EntityId::parse_tag(&id.to_string()), Some(id));
        assert_eq!(EntityId::parse_tag("npc:42"), None);
        assert_eq!(EntityId::parse_tag("caster"), None);
    }

    #[test]
    fn step_away_moves_in_opposite_direction() {
        let a = RoomId::world("s", 0, 0);
        let threat = RoomId::world("s", 1, 0);
        assert_eq!(a.step_away(&threat), RoomId::world("s", -1, 0));
    }
}
