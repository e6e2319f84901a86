//! Error taxonomy (§7). These are kinds, not a single catch-all error type:
//! the tick loop never raises outward, so most of these surface as fields
//! on a result struct (`NpcDeathResult`, `Option<ResolvedMove>`, ...) rather
//! than as a `Result` the caller must handle. `EngageError` and
//! `ConfigError` are the two places a real `Result` crosses an API
//! boundary.

use thiserror::Error;

/// Engage State Law rejection reasons (`TargetInvalid`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum EngageError {
    #[error("target is stealthed")]
    Stealth,
    #[error("target is out of room")]
    OutOfRoom,
    #[error("target is dead")]
    Dead,
    #[error("target is protected")]
    Protected,
}

/// Malformed configuration input (`ConfigFault`). Rejected with a warning;
/// never causes a mutation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("malformed room id: {0}")]
    MalformedRoomId(String),
    #[error("non-finite value for {field}")]
    NonFiniteValue { field: &'static str },
    #[error("invalid value for {key}: {value}")]
    InvalidEnvValue { key: &'static str, value: String },
}

/// Centralized, stable user-facing strings for blocked-reason lines,
/// keyed by `EngageError` so every caller (MUD command layer, guard
/// fallback attack, brain dispatch) gets the same wording.
pub fn reason_line(reason: EngageError) -> &'static str {
    match reason {
        EngageError::Stealth => "[world] It fails.",
        EngageError::OutOfRoom => "[world] Target is out of range.",
        EngageError::Dead => "[world] Target is already dead.",
        EngageError::Protected => "[world] Target is immune.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_lines_are_stable() {
        assert_eq!(reason_line(EngageError::Protected), "[world] Target is immune.");
        assert_eq!(reason_line(EngageError::Stealth), "[world] It fails.");
    }
}
