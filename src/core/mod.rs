//! Core primitives.
//!
//! Integer fixed-point money/multiplier types and the seedable PRNG
//! behind crash point generation.

pub mod fixed;
pub mod rng;

// Re-export core types
pub use fixed::{Amount, Multiplier, HUNDREDTHS_PER_UNIT};
pub use rng::{derive_round_seed, DeterministicRng};
