//! Round State
//!
//! The single live play cycle owned by the engine.

use serde::{Deserialize, Serialize};

use crate::core::fixed::Multiplier;

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    /// No round, nothing scheduled. Left on startup, shutdown or after a fault.
    #[default]
    Idle,
    /// Multiplier is rising.
    Running,
    /// Round crashed, next one is scheduled.
    Crashed,
}

/// One play cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    /// Counter bumped at every round start. Timer callbacks carry it.
    pub generation: u64,
    /// Current multiplier. Never decreases within a round.
    pub multiplier: Multiplier,
    /// Threshold at which the round ends. Hidden from clients until the crash.
    pub crash_point: Multiplier,
    /// True from start until the crash is detected.
    pub is_running: bool,
}

impl Round {
    /// Pre-start placeholder, generation 0.
    pub fn idle(base: Multiplier) -> Self {
        Self {
            generation: 0,
            multiplier: base,
            crash_point: base,
            is_running: false,
        }
    }

    /// Fresh running round.
    pub fn begin(generation: u64, base: Multiplier, crash_point: Multiplier) -> Self {
        Self {
            generation,
            multiplier: base,
            crash_point,
            is_running: true,
        }
    }

    /// Advance by one tick. Returns true once the crash point is reached.
    pub fn advance(&mut self, increment: Multiplier) -> bool {
        self.multiplier = self.multiplier.saturating_add(increment);
        self.has_crashed()
    }

    /// Whether the multiplier has reached the crash point.
    #[inline]
    pub fn has_crashed(&self) -> bool {
        self.multiplier >= self.crash_point
    }
}
