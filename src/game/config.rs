//! Round Configuration
//!
//! Tunable constants for multiplier progression, crash range and pacing.

use std::time::Duration;

use thiserror::Error;

use crate::core::fixed::Multiplier;

/// Environment variable overriding the starting multiplier (decimal).
pub const ENV_BASE_MULTIPLIER: &str = "CRASH_BASE_MULTIPLIER";
/// Environment variable overriding the tick interval (milliseconds).
pub const ENV_TICK_INTERVAL_MS: &str = "CRASH_TICK_INTERVAL_MS";
/// Environment variable overriding the per-tick increment (decimal).
pub const ENV_TICK_INCREMENT: &str = "CRASH_TICK_INCREMENT";
/// Environment variable overriding the exclusive crash upper bound (decimal).
pub const ENV_UPPER_BOUND: &str = "CRASH_UPPER_BOUND";
/// Environment variable overriding the restart delay (milliseconds).
pub const ENV_RESTART_DELAY_MS: &str = "CRASH_RESTART_DELAY_MS";

/// Configuration for the round lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    /// Multiplier every round starts from. Also the inclusive crash lower bound.
    pub base_multiplier: Multiplier,
    /// Period of the round clock.
    pub tick_interval: Duration,
    /// Multiplier added on every tick.
    pub tick_increment: Multiplier,
    /// Exclusive upper bound for generated crash points.
    pub crash_upper_bound: Multiplier,
    /// Pause between a crash and the next round.
    pub restart_delay: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            base_multiplier: Multiplier::from_hundredths(10),  // 0.10x
            tick_interval: Duration::from_millis(100),
            tick_increment: Multiplier::from_hundredths(1),    // +0.01 per tick
            crash_upper_bound: Multiplier::from_hundredths(500), // 5.00x
            restart_delay: Duration::from_millis(5000),
        }
    }
}

impl GameConfig {
    /// Defaults overridden by `CRASH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `CRASH_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_BASE_MULTIPLIER) {
            config.base_multiplier = parse_multiplier(ENV_BASE_MULTIPLIER, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TICK_INTERVAL_MS) {
            config.tick_interval = parse_millis(ENV_TICK_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TICK_INCREMENT) {
            config.tick_increment = parse_multiplier(ENV_TICK_INCREMENT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_UPPER_BOUND) {
            config.crash_upper_bound = parse_multiplier(ENV_UPPER_BOUND, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RESTART_DELAY_MS) {
            config.restart_delay = parse_millis(ENV_RESTART_DELAY_MS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_multiplier >= self.crash_upper_bound {
            return Err(ConfigError::EmptyCrashRange {
                base: self.base_multiplier,
                upper: self.crash_upper_bound,
            });
        }
        if self.tick_increment == Multiplier::ZERO {
            return Err(ConfigError::ZeroIncrement);
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(())
    }
}

fn parse_multiplier(key: &'static str, raw: &str) -> Result<Multiplier, ConfigError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(Multiplier::from_f64)
        .ok_or_else(|| ConfigError::InvalidValue { key, value: raw.to_string() })
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue { key, value: raw.to_string() })
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value as given.
        value: String,
    },

    /// Base multiplier is not below the crash upper bound.
    #[error("crash range is empty: base {base} must be below upper bound {upper}")]
    EmptyCrashRange {
        /// Configured base multiplier.
        base: Multiplier,
        /// Configured upper bound.
        upper: Multiplier,
    },

    /// Tick increment is zero, so a round would never crash.
    #[error("tick increment must be greater than zero")]
    ZeroIncrement,

    /// Tick interval is zero.
    #[error("tick interval must be greater than zero")]
    ZeroTickInterval,
}
