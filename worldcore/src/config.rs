//! Startup configuration (§6). Every `PW_*` environment variable is read
//! exactly once, here, into a plain struct that is then threaded through
//! constructors — no code path reads the environment mid-tick (Design
//! Notes: "ad-hoc env var reads scattered across files").

use std::time::Duration;

use crate::error::ConfigError;
use crate::npc::train::{TrainConfig, TrainProfile};

#[derive(Clone, Debug)]
pub struct Config {
    pub tick_interval_ms: u64,

    pub corpse_npc_ms: u64,
    pub corpse_beast_ms: u64,
    pub corpse_resource_ms: u64,
    pub respawn_after_corpse_ms: u64,

    pub debug_entity: bool,

    pub train: TrainConfig,

    pub assist_threat_share_pct: f64,
    pub assist_threat_share_min: f64,
    pub assist_threat_share_max: f64,
    pub assist_min_threat_delta_to_bump: f64,
    pub assist_call_cooldown_ms: u64,
    pub assist_offender_window_ms: u64,
    pub assist_max_allies_per_call: usize,
    pub assist_mark_ttl_ms: u64,

    pub taunt_immunity_ms: u64,
    pub threat_heal_mult: f64,

    pub town_sanctuary_pressure_window_ms: u64,
    pub town_sanctuary_pressure_threshold: u32,
    pub town_sanctuary_pressure_cooldown_ms: u64,
    pub town_siege_alarm_range_tiles: u32,
    pub town_siege_alarm_cooldown_ms: u64,
    pub town_recently_aggressive_window_ms: u64,

    pub hot_tick_messages: bool,
    pub dot_combat_log: bool,

    pub test_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,

            corpse_npc_ms: 15_000,
            corpse_beast_ms: 20_000,
            corpse_resource_ms: 2_500,
            respawn_after_corpse_ms: 8_000,

            debug_entity: false,

            train: TrainConfig::default(),

            assist_threat_share_pct: 0.5,
            assist_threat_share_min: 1.0,
            assist_threat_share_max: 50.0,
            assist_min_threat_delta_to_bump: 0.0,
            assist_call_cooldown_ms: 0,
            assist_offender_window_ms: 0,
            assist_max_allies_per_call: 0,
            assist_mark_ttl_ms: 0,

            taunt_immunity_ms: 0,
            threat_heal_mult: 0.5,

            town_sanctuary_pressure_window_ms: 15_000,
            town_sanctuary_pressure_threshold: 12,
            town_sanctuary_pressure_cooldown_ms: 15_000,
            town_siege_alarm_range_tiles: 0,
            town_siege_alarm_cooldown_ms: 15_000,
            town_recently_aggressive_window_ms: 10_000,

            hot_tick_messages: false,
            dot_combat_log: false,

            test_mode: false,
        }
    }
}

impl Config {
    /// Build a `Config` from `PW_*`/`WORLDCORE_TEST` environment variables,
    /// falling back to the stated defaults. Malformed values are rejected
    /// per-key with a `ConfigError` rather than panicking the process;
    /// callers typically log and keep the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        for (key, apply) in Self::appliers() {
            if let Ok(raw) = std::env::var(key) {
                if let Err(err) = apply(&mut cfg, &raw) {
                    tracing::warn!(%key, %raw, error = %err, "ignoring malformed env var");
                }
            }
        }

        if cfg.test_mode {
            cfg.corpse_npc_ms = 5;
            cfg.corpse_beast_ms = 5;
            cfg.corpse_resource_ms = 5;
            cfg.respawn_after_corpse_ms = 60;
        }

        let soft = std::env::var("PW_TRAIN_SOFT_LEASH").ok();
        let hard = std::env::var("PW_TRAIN_HARD_LEASH").ok();
        let _ = (soft, hard); // already applied via appliers(); kept for readability of intent.

        cfg
    }

    #[allow(clippy::type_complexity)]
    fn appliers() -> Vec<(&'static str, fn(&mut Config, &str) -> Result<(), ConfigError>)> {
        vec![
            ("WORLDCORE_TEST", |c, v| { c.test_mode = parse_bool(v)?; Ok(()) }),
            ("PW_CORPSE_NPC_MS", |c, v| { c.corpse_npc_ms = parse_u64("PW_CORPSE_NPC_MS", v)?; Ok(()) }),
            ("PW_CORPSE_BEAST_MS", |c, v| { c.corpse_beast_ms = parse_u64("PW_CORPSE_BEAST_MS", v)?; Ok(()) }),
            ("PW_CORPSE_RESOURCE_MS", |c, v| { c.corpse_resource_ms = parse_u64("PW_CORPSE_RESOURCE_MS", v)?; Ok(()) }),
            ("PW_RESPAWN_AFTER_CORPSE_MS", |c, v| { c.respawn_after_corpse_ms = parse_u64("PW_RESPAWN_AFTER_CORPSE_MS", v)?; Ok(()) }),
            ("PW_DEBUG_ENTITY", |c, v| { c.debug_entity = parse_bool(v)?; Ok(()) }),
            ("PW_TRAIN_ENABLED", |c, v| { c.train.enabled = parse_bool(v)?; Ok(()) }),
            ("PW_TRAIN_STEP", |c, v| { c.train.step = parse_f64("PW_TRAIN_STEP", v)?; Ok(()) }),
            ("PW_TRAIN_SOFT_LEASH", |c, v| { c.train.soft_leash = parse_f64("PW_TRAIN_SOFT_LEASH", v)?; Ok(()) }),
            ("PW_TRAIN_HARD_LEASH", |c, v| { c.train.hard_leash = parse_f64("PW_TRAIN_HARD_LEASH", v)?; Ok(()) }),
            ("PW_TRAIN_PURSUE_TIMEOUT_MS", |c, v| { c.train.pursue_timeout_ms = parse_u64("PW_TRAIN_PURSUE_TIMEOUT_MS", v)?; Ok(()) }),
            ("PW_TRAIN_ROOMS_ENABLED", |c, v| { c.train.rooms_enabled = parse_bool(v)?; Ok(()) }),
            ("PW_TRAIN_MAX_ROOMS_FROM_SPAWN", |c, v| { c.train.max_rooms_from_spawn = parse_u32("PW_TRAIN_MAX_ROOMS_FROM_SPAWN", v)?; Ok(()) }),
            ("PW_TRAIN_ASSIST_ENABLED", |c, v| { c.train.assist_enabled = parse_bool(v)?; Ok(()) }),
            ("PW_TRAIN_ASSIST_SNAP_ALLIES", |c, v| { c.train.assist_snap_allies = parse_bool(v)?; Ok(()) }),
            ("PW_TRAIN_ASSIST_SNAP_MAX_ALLIES", |c, v| { c.train.assist_snap_max_allies = parse_u32("PW_TRAIN_ASSIST_SNAP_MAX_ALLIES", v)?; Ok(()) }),
            ("PW_TRAIN_ASSIST_RANGE", |c, v| { c.train.assist_range = parse_u32("PW_TRAIN_ASSIST_RANGE", v)?; Ok(()) }),
            ("PW_TRAIN_RETURN_MODE", |c, v| { c.train.return_mode = parse_return_mode(v)?; Ok(()) }),
            ("PW_ASSIST_THREAT_SHARE_PCT", |c, v| { c.assist_threat_share_pct = parse_f64("PW_ASSIST_THREAT_SHARE_PCT", v)?; Ok(()) }),
            ("PW_ASSIST_THREAT_SHARE_MIN", |c, v| { c.assist_threat_share_min = parse_f64("PW_ASSIST_THREAT_SHARE_MIN", v)?; Ok(()) }),
            ("PW_ASSIST_THREAT_SHARE_MAX", |c, v| { c.assist_threat_share_max = parse_f64("PW_ASSIST_THREAT_SHARE_MAX", v)?; Ok(()) }),
            ("PW_ASSIST_MIN_THREAT_DELTA_TO_BUMP", |c, v| { c.assist_min_threat_delta_to_bump = parse_f64("PW_ASSIST_MIN_THREAT_DELTA_TO_BUMP", v)?; Ok(()) }),
            ("PW_ASSIST_CALL_COOLDOWN_MS", |c, v| { c.assist_call_cooldown_ms = parse_u64("PW_ASSIST_CALL_COOLDOWN_MS", v)?; Ok(()) }),
            ("PW_ASSIST_OFFENDER_WINDOW_MS", |c, v| { c.assist_offender_window_ms = parse_u64("PW_ASSIST_OFFENDER_WINDOW_MS", v)?; Ok(()) }),
            ("PW_ASSIST_MAX_ALLIES_PER_CALL", |c, v| { c.assist_max_allies_per_call = parse_u32("PW_ASSIST_MAX_ALLIES_PER_CALL", v)? as usize; Ok(()) }),
            ("PW_ASSIST_MARK_TTL_MS", |c, v| { c.assist_mark_ttl_ms = parse_u64("PW_ASSIST_MARK_TTL_MS", v)?; Ok(()) }),
            ("PW_TAUNT_IMMUNITY_MS", |c, v| { c.taunt_immunity_ms = parse_u64("PW_TAUNT_IMMUNITY_MS", v)?; Ok(()) }),
            ("PW_THREAT_HEAL_MULT", |c, v| { c.threat_heal_mult = parse_f64("PW_THREAT_HEAL_MULT", v)?; Ok(()) }),
            ("PW_TOWN_SANCTUARY_PRESSURE_WINDOW_MS", |c, v| { c.town_sanctuary_pressure_window_ms = parse_u64("PW_TOWN_SANCTUARY_PRESSURE_WINDOW_MS", v)?; Ok(()) }),
            ("PW_TOWN_SANCTUARY_PRESSURE_THRESHOLD", |c, v| { c.town_sanctuary_pressure_threshold = parse_u32("PW_TOWN_SANCTUARY_PRESSURE_THRESHOLD", v)?; Ok(()) }),
            ("PW_TOWN_SANCTUARY_PRESSURE_COOLDOWN_MS", |c, v| { c.town_sanctuary_pressure_cooldown_ms = parse_u64("PW_TOWN_SANCTUARY_PRESSURE_COOLDOWN_MS", v)?; Ok(()) }),
            ("PW_TOWN_SIEGE_ALARM_RANGE_TILES", |c, v| { c.town_siege_alarm_range_tiles = parse_u32("PW_TOWN_SIEGE_ALARM_RANGE_TILES", v)?; Ok(()) }),
            ("PW_TOWN_SIEGE_ALARM_COOLDOWN_MS", |c, v| { c.town_siege_alarm_cooldown_ms = parse_u64("PW_TOWN_SIEGE_ALARM_COOLDOWN_MS", v)?; Ok(()) }),
            ("PW_TOWN_RECENTLY_AGGRESSIVE_WINDOW_MS", |c, v| { c.town_recently_aggressive_window_ms = parse_u64("PW_TOWN_RECENTLY_AGGRESSIVE_WINDOW_MS", v)?; Ok(()) }),
            ("PW_HOT_TICK_MESSAGES", |c, v| { c.hot_tick_messages = parse_bool(v)?; Ok(()) }),
            ("PW_DOT_COMBAT_LOG", |c, v| { c.dot_combat_log = parse_bool(v)?; Ok(()) }),
        ]
    }
}

fn parse_bool(v: &str) -> Result<bool, ConfigError> {
    match v {
        "1" | "true" | "TRUE" | "yes" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvValue { key: "bool", value: other.to_string() }),
    }
}

fn parse_u64(key: &'static str, v: &str) -> Result<u64, ConfigError> {
    v.trim().parse().map_err(|_| ConfigError::InvalidEnvValue { key, value: v.to_string() })
}

fn parse_u32(key: &'static str, v: &str) -> Result<u32, ConfigError> {
    v.trim().parse().map_err(|_| ConfigError::InvalidEnvValue { key, value: v.to_string() })
}

fn parse_f64(key: &'static str, v: &str) -> Result<f64, ConfigError> {
    let parsed: f64 = v.trim().parse().map_err(|_| ConfigError::InvalidEnvValue { key, value: v.to_string() })?;
    if !parsed.is_finite() {
        return Err(ConfigError::NonFiniteValue { field: key });
    }
    Ok(parsed)
}

fn parse_return_mode(v: &str) -> Result<TrainProfile, ConfigError> {
    match v {
        "snap" => Ok(TrainProfile::Snap),
        "drift" => Ok(TrainProfile::Drift),
        other => Err(ConfigError::InvalidEnvValue { key: "PW_TRAIN_RETURN_MODE", value: other.to_string() }),
    }
}

pub fn tick_duration(cfg: &Config) -> Duration {
    Duration::from_millis(cfg.tick_interval_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.corpse_npc_ms, 15_000);
        assert_eq!(cfg.corpse_beast_ms, 20_000);
        assert_eq!(cfg.corpse_resource_ms, 2_500);
        assert_eq!(cfg.respawn_after_corpse_ms, 8_000);
        assert_eq!(cfg.assist_threat_share_pct, 0.5);
        assert_eq!(cfg.threat_heal_mult, 0.5);
    }

    #[test]
    fn test_mode_collapses_delays() {
        std::env::set_var("WORLDCORE_TEST", "1");
        let cfg = Config::from_env();
        std::env::remove_var("WORLDCORE_TEST");
        assert_eq!(cfg.corpse_npc_ms, 5);
        assert_eq!(cfg.respawn_after_corpse_ms, 60);
    }

    #[test]
    fn malformed_numeric_env_var_is_ignored_not_fatal() {
        std::env::set_var("PW_CORPSE_NPC_MS", "not-a-number");
        let cfg = Config::from_env();
        std::env::remove_var("PW_CORPSE_NPC_MS");
        assert_eq!(cfg.corpse_npc_ms, 15_000);
    }
}
