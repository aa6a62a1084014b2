//! Crash Point Generation
//!
//! Picks the multiplier at which a round ends. The value is drawn uniformly
//! from `[base_multiplier, crash_upper_bound)` in hundredths, so it is
//! already rounded to two decimals.
//!
//! This is plain local randomness. Nothing here commits to the crash point
//! ahead of time, so it is not a provably fair scheme.

use thiserror::Error;

use crate::core::fixed::Multiplier;
use crate::core::rng::DeterministicRng;
use crate::game::config::GameConfig;

/// Source of crash points, one per round.
pub trait CrashPointGenerator: Send {
    /// Produce the crash point for the next round.
    fn generate(&mut self) -> Result<Multiplier, GeneratorError>;
}

/// Crash point generation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// Lower bound is not below the upper bound.
    #[error("empty crash range [{low}, {high})")]
    EmptyRange {
        /// Inclusive lower bound.
        low: Multiplier,
        /// Exclusive upper bound.
        high: Multiplier,
    },

    /// Underlying randomness source failed.
    #[error("randomness source failed: {0}")]
    Source(String),
}

/// Uniform crash point generator.
#[derive(Debug, Clone)]
pub struct RandomCrashGenerator {
    low: Multiplier,
    high: Multiplier,
    rng: DeterministicRng,
}

impl RandomCrashGenerator {
    /// Generator over the configured range, seeded from fresh entropy.
    pub fn from_config(config: &GameConfig) -> Self {
        Self::with_rng(config, DeterministicRng::from_entropy())
    }

    /// Generator over the configured range with an explicit RNG.
    pub fn with_rng(config: &GameConfig, rng: DeterministicRng) -> Self {
        Self {
            low: config.base_multiplier,
            high: config.crash_upper_bound,
            rng,
        }
    }

    /// Inclusive lower and exclusive upper bound.
    pub fn range(&self) -> (Multiplier, Multiplier) {
        (self.low, self.high)
    }
}

impl CrashPointGenerator for RandomCrashGenerator {
    fn generate(&mut self) -> Result<Multiplier, GeneratorError> {
        if self.low >= self.high {
            return Err(GeneratorError::EmptyRange { low: self.low, high: self.high });
        }
        let hundredths = self.rng.next_in_range(self.low.hundredths(), self.high.hundredths());
        Ok(Multiplier::from_hundredths(hundredths))
    }
}
