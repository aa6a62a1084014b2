//! Round Engine
//!
//! The round lifecycle state machine:
//!
//! ```text
//!   Idle ──connect──▶ Running ──tick (multiplier >= crash point)──▶ Crashed
//!                        ▲                                            │
//!                        └──────────── restart (after delay) ─────────┘
//! ```
//!
//! Every handler runs to completion without awaiting, so the engine needs no
//! locks as long as calls are serialized (see [`crate::game::driver`]).
//! Timer callbacks carry the round generation they were scheduled for;
//! anything stale is dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::fixed::{Amount, Multiplier};
use crate::game::config::GameConfig;
use crate::game::crash::{CrashPointGenerator, GeneratorError};
use crate::game::events::{BroadcastGateway, GameEvent};
use crate::game::registry::{BetError, ConnectionId, PlayerRegistry};
use crate::game::round::{EnginePhase, Round};

/// Timers the engine owns: the round clock and the delayed restart.
///
/// Implementations deliver `Tick`/`Restart` back to the engine tagged with
/// the generation passed in here.
pub trait RoundScheduler: Send {
    /// Begin periodic ticks for `generation`, replacing any running clock.
    fn start_clock(&mut self, generation: u64, every: Duration);

    /// Stop the round clock. Idempotent.
    fn stop_clock(&mut self);

    /// Deliver a restart for `generation` once `after` has elapsed.
    fn schedule_restart(&mut self, generation: u64, after: Duration);

    /// Drop a pending restart, if any.
    fn cancel_restart(&mut self);
}

/// Engine faults. These end the current round, never the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A round is already in progress.
    #[error("round already running")]
    AlreadyRunning,

    /// Crash point could not be generated.
    #[error("crash point generation failed: {0}")]
    Generator(#[from] GeneratorError),
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick belonged to an older round or arrived outside Running.
    Stale,
    /// Multiplier advanced to the contained value.
    Advanced(Multiplier),
    /// Multiplier reached the crash point and the round was settled.
    Crashed(CrashReport),
}

/// Settlement summary of a crashed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// Round generation that crashed.
    pub generation: u64,
    /// Crash point of that round.
    pub crash_point: Multiplier,
    /// Players whose bets were forfeited, in settlement order.
    pub losers: Vec<ConnectionId>,
    /// Total stake forfeited.
    pub forfeited: Amount,
}

/// Point-in-time view of the engine. Never includes the crash point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    /// Lifecycle phase.
    pub phase: EnginePhase,
    /// Current round generation.
    pub generation: u64,
    /// Current multiplier.
    pub multiplier: Multiplier,
    /// Connected players.
    pub players: usize,
    /// Bets still riding.
    pub active_bets: usize,
}

/// Owns the live round and the player registry.
pub struct RoundEngine {
    config: GameConfig,
    phase: EnginePhase,
    round: Round,
    registry: PlayerRegistry,
    generator: Box<dyn CrashPointGenerator>,
    gateway: Arc<dyn BroadcastGateway>,
    scheduler: Box<dyn RoundScheduler>,
}

impl RoundEngine {
    /// Create an idle engine.
    pub fn new(
        config: GameConfig,
        generator: Box<dyn CrashPointGenerator>,
        gateway: Arc<dyn BroadcastGateway>,
        scheduler: Box<dyn RoundScheduler>,
    ) -> Self {
        let round = Round::idle(config.base_multiplier);
        Self {
            config,
            phase: EnginePhase::Idle,
            round,
            registry: PlayerRegistry::new(),
            generator,
            gateway,
            scheduler,
        }
    }

    // =========================================================================
    // ROUND LIFECYCLE
    // =========================================================================

    /// Start a new round.
    ///
    /// On generator failure the clock is stopped, the engine drops to Idle
    /// and the error is returned. The next connect starts over.
    pub fn start_round(&mut self) -> Result<(), EngineError> {
        if self.phase == EnginePhase::Running {
            return Err(EngineError::AlreadyRunning);
        }

        let crash_point = match self.generator.generate() {
            Ok(point) => point,
            Err(e) => {
                self.fail_round();
                error!("Failed to start round: {}", e);
                return Err(e.into());
            }
        };

        let generation = self.round.generation + 1;
        self.scheduler.cancel_restart();
        self.round = Round::begin(generation, self.config.base_multiplier, crash_point);
        self.phase = EnginePhase::Running;

        info!("Round {} started", generation);
        debug!("Round {} crash point: {}x", generation, crash_point);

        self.gateway.broadcast(GameEvent::GameStart {});
        self.registry.reset_all_for_new_round();
        self.scheduler.start_clock(generation, self.config.tick_interval);

        Ok(())
    }

    /// Advance the multiplier for `generation`, crashing if the threshold is reached.
    pub fn on_tick(&mut self, generation: u64) -> TickOutcome {
        if self.phase != EnginePhase::Running || generation != self.round.generation {
            debug!("Dropping stale tick for round {}", generation);
            return TickOutcome::Stale;
        }

        let crashed = self.round.advance(self.config.tick_increment);
        let multiplier = self.round.multiplier;

        #[cfg(feature = "debug-tracing")]
        tracing::trace!("Round {} at {}x", generation, multiplier);

        self.gateway.broadcast(GameEvent::MultiplierUpdate { multiplier });

        if crashed {
            TickOutcome::Crashed(self.crash())
        } else {
            TickOutcome::Advanced(multiplier)
        }
    }

    /// Settle the round and schedule the next one.
    fn crash(&mut self) -> CrashReport {
        self.scheduler.stop_clock();
        self.round.is_running = false;
        self.phase = EnginePhase::Crashed;

        let generation = self.round.generation;
        let crash_point = self.round.crash_point;
        info!("Round {} crashed at {}x", generation, crash_point);

        self.gateway.broadcast(GameEvent::GameCrash { crash_point });

        let losers = self.registry.active_losers();
        let mut forfeited = Amount::ZERO;
        for id in &losers {
            match self.registry.forfeit(id) {
                Ok(lost) => {
                    forfeited = Amount::from_cents(forfeited.cents().saturating_add(lost.cents()));
                    debug!("Player {} lost {}", id, lost);
                    self.gateway.send_to(id, GameEvent::player_lost());
                }
                Err(e) => warn!("Could not settle player {}: {}", id, e),
            }
        }

        self.scheduler.schedule_restart(generation, self.config.restart_delay);

        CrashReport { generation, crash_point, losers, forfeited }
    }

    /// Start the next round if the restart for `generation` is still current.
    pub fn on_restart(&mut self, generation: u64) -> Result<bool, EngineError> {
        if self.phase != EnginePhase::Crashed || generation != self.round.generation {
            debug!("Dropping stale restart for round {}", generation);
            return Ok(false);
        }
        self.start_round()?;
        Ok(true)
    }

    /// Stop all timers and go Idle.
    pub fn shutdown(&mut self) {
        self.scheduler.stop_clock();
        self.scheduler.cancel_restart();
        self.round.is_running = false;
        self.phase = EnginePhase::Idle;
        info!("Engine shut down after round {}", self.round.generation);
    }

    fn fail_round(&mut self) {
        self.scheduler.stop_clock();
        self.scheduler.cancel_restart();
        self.round.is_running = false;
        self.phase = EnginePhase::Idle;
    }

    // =========================================================================
    // PARTICIPANT EVENTS
    // =========================================================================

    /// A participant connected.
    pub fn on_connect(&mut self, id: ConnectionId) -> Result<(), EngineError> {
        self.registry.register(id);
        info!("Player connected: {} ({} online)", id, self.registry.len());

        if self.phase == EnginePhase::Idle {
            self.start_round()
        } else {
            self.gateway.send_to(
                &id,
                GameEvent::MultiplierUpdate { multiplier: self.round.multiplier },
            );
            Ok(())
        }
    }

    /// A participant disconnected. The round is unaffected.
    pub fn on_disconnect(&mut self, id: &ConnectionId) {
        match self.registry.unregister(id) {
            Ok(player) if player.is_active() => {
                info!("Player disconnected with {} riding: {}", player.bet_amount, id);
            }
            Ok(_) => info!("Player disconnected: {}", id),
            Err(_) => debug!("Disconnect for unknown player {}", id),
        }
    }

    /// A participant wagers `amount`.
    pub fn on_place_bet(&mut self, id: &ConnectionId, amount: f64) -> Result<Amount, BetError> {
        let result = self.admit_bet(id, amount);

        match &result {
            Ok(amount) => {
                info!("Player {} placed a bet of {}", id, amount);
                self.gateway.send_to(id, GameEvent::BetSuccess { amount: *amount });
            }
            Err(e) => {
                debug!("Bet from {} refused: {}", id, e);
                self.gateway.send_to(id, GameEvent::bet_failed(e));
            }
        }

        result
    }

    fn admit_bet(&mut self, id: &ConnectionId, amount: f64) -> Result<Amount, BetError> {
        if self.phase != EnginePhase::Running {
            return Err(BetError::GameNotRunning);
        }
        // Unrepresentable amounts count as zero so the registry's own check order applies
        let amount = Amount::from_f64(amount).unwrap_or(Amount::ZERO);
        self.registry.place_bet(id, amount)?;
        Ok(amount)
    }

    /// A participant cashes out at the current multiplier.
    pub fn on_cash_out(&mut self, id: &ConnectionId) -> Result<Amount, BetError> {
        let multiplier = self.round.multiplier;
        let result = self.registry.cash_out(id, multiplier);

        match &result {
            Ok(payout) => {
                info!("Player {} cashed out at {}x, payout: {}", id, multiplier, payout);
                self.gateway.send_to(id, GameEvent::CashOutSuccess { payout: *payout });
            }
            Err(e) => {
                debug!("Cash-out from {} refused: {}", id, e);
                self.gateway.send_to(id, GameEvent::cash_out_failed(e));
            }
        }

        result
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Current lifecycle phase.
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// The live round.
    pub fn round(&self) -> &Round {
        &self.round
    }

    /// Player registry.
    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Summary safe to show to anyone.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.phase,
            generation: self.round.generation,
            multiplier: self.round.multiplier,
            players: self.registry.len(),
            active_bets: self.registry.active_bet_count(),
        }
    }
}
