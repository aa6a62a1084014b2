//! Engine Driver
//!
//! Runs a [`RoundEngine`] as a single tokio task fed by one mailbox.
//! Connection tasks, the round clock and the restart timer all post
//! [`EngineCommand`]s; the task applies them one at a time, so the engine
//! never sees two events at once.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::clock::RoundClock;
use crate::game::config::GameConfig;
use crate::game::crash::CrashPointGenerator;
use crate::game::engine::{EngineSnapshot, RoundEngine, RoundScheduler, TickOutcome};
use crate::game::events::BroadcastGateway;
use crate::game::registry::ConnectionId;

/// Everything the engine task reacts to.
#[derive(Debug)]
pub enum EngineCommand {
    /// Participant connected.
    Connect(ConnectionId),
    /// Participant went away.
    Disconnect(ConnectionId),
    /// Wager request with the raw client amount.
    PlaceBet {
        /// Requesting participant.
        id: ConnectionId,
        /// Amount as sent.
        amount: f64,
    },
    /// Cash-out request.
    CashOut(ConnectionId),
    /// Round clock fired.
    Tick {
        /// Generation the clock was started for.
        generation: u64,
    },
    /// Restart delay elapsed.
    Restart {
        /// Generation whose crash scheduled this restart.
        generation: u64,
    },
    /// Read a snapshot.
    Snapshot(oneshot::Sender<EngineSnapshot>),
    /// Stop timers and end the task.
    Shutdown,
}

/// Engine task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("engine task has stopped")]
pub struct EngineClosed;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Tokio-backed timers that post back into the engine mailbox.
pub struct TokioScheduler {
    mailbox: mpsc::UnboundedSender<EngineCommand>,
    clock: RoundClock,
    restart: Option<JoinHandle<()>>,
}

impl TokioScheduler {
    /// Create a scheduler posting into `mailbox`.
    pub fn new(mailbox: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self {
            mailbox,
            clock: RoundClock::new(),
            restart: None,
        }
    }
}

impl RoundScheduler for TokioScheduler {
    fn start_clock(&mut self, generation: u64, every: Duration) {
        let mailbox = self.mailbox.clone();
        self.clock.start(every, move || {
            let _ = mailbox.send(EngineCommand::Tick { generation });
        });
    }

    fn stop_clock(&mut self) {
        self.clock.stop();
    }

    fn schedule_restart(&mut self, generation: u64, after: Duration) {
        self.cancel_restart();
        let mailbox = self.mailbox.clone();
        self.restart = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = mailbox.send(EngineCommand::Restart { generation });
        }));
    }

    fn cancel_restart(&mut self) {
        if let Some(handle) = self.restart.take() {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_restart();
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable front door to the engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    fn post(&self, command: EngineCommand) -> Result<(), EngineClosed> {
        self.tx.send(command).map_err(|_| EngineClosed)
    }

    /// Report a new participant.
    pub fn connect(&self, id: ConnectionId) -> Result<(), EngineClosed> {
        self.post(EngineCommand::Connect(id))
    }

    /// Report a departed participant.
    pub fn disconnect(&self, id: ConnectionId) -> Result<(), EngineClosed> {
        self.post(EngineCommand::Disconnect(id))
    }

    /// Forward a wager. The reply goes out through the gateway.
    pub fn place_bet(&self, id: ConnectionId, amount: f64) -> Result<(), EngineClosed> {
        self.post(EngineCommand::PlaceBet { id, amount })
    }

    /// Forward a cash-out. The reply goes out through the gateway.
    pub fn cash_out(&self, id: ConnectionId) -> Result<(), EngineClosed> {
        self.post(EngineCommand::CashOut(id))
    }

    /// Current engine snapshot.
    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineClosed> {
        let (reply, rx) = oneshot::channel();
        self.post(EngineCommand::Snapshot(reply))?;
        rx.await.map_err(|_| EngineClosed)
    }

    /// Ask the engine task to stop.
    pub fn shutdown(&self) -> Result<(), EngineClosed> {
        self.post(EngineCommand::Shutdown)
    }

    /// Whether the engine task is still accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// TASK
// =============================================================================

/// Spawn the engine task. Must be called inside a tokio runtime.
pub fn spawn_engine(
    config: GameConfig,
    generator: Box<dyn CrashPointGenerator>,
    gateway: Arc<dyn BroadcastGateway>,
) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = TokioScheduler::new(tx.clone());
    let engine = RoundEngine::new(config, generator, gateway, Box::new(scheduler));

    let task = tokio::spawn(run_engine(engine, rx));
    (EngineHandle { tx }, task)
}

async fn run_engine(mut engine: RoundEngine, mut rx: mpsc::UnboundedReceiver<EngineCommand>) {
    info!("Engine task started");

    while let Some(command) = rx.recv().await {
        match command {
            EngineCommand::Connect(id) => {
                if let Err(e) = engine.on_connect(id) {
                    warn!("Connect from {} did not start a round: {}", id, e);
                }
            }
            EngineCommand::Disconnect(id) => engine.on_disconnect(&id),
            EngineCommand::PlaceBet { id, amount } => {
                let _ = engine.on_place_bet(&id, amount);
            }
            EngineCommand::CashOut(id) => {
                let _ = engine.on_cash_out(&id);
            }
            EngineCommand::Tick { generation } => {
                if let TickOutcome::Crashed(report) = engine.on_tick(generation) {
                    debug!(
                        "Round {} settled: {} losers, {} forfeited",
                        report.generation,
                        report.losers.len(),
                        report.forfeited
                    );
                }
            }
            EngineCommand::Restart { generation } => {
                if let Err(e) = engine.on_restart(generation) {
                    warn!("Restart after round {} failed: {}", generation, e);
                }
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(engine.snapshot());
            }
            EngineCommand::Shutdown => break,
        }
    }

    engine.shutdown();
    info!("Engine task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{Amount, Multiplier};
    use crate::game::engine::testing::ScriptedGenerator;
    use crate::game::events::testing::RecordingGateway;
    use crate::game::events::GameEvent;
    use crate::game::round::EnginePhase;

    fn id(n: u8) -> ConnectionId {
        ConnectionId::new([n; 16])
    }

    fn spawn(points: &[u32]) -> (EngineHandle, JoinHandle<()>, Arc<RecordingGateway>) {
        let gateway = Arc::new(RecordingGateway::default());
        let (handle, task) = spawn_engine(
            GameConfig::default(),
            Box::new(ScriptedGenerator::new(points)),
            gateway.clone(),
        );
        (handle, task, gateway)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_runs_crashes_and_restarts() {
        let (handle, _task, gateway) = spawn(&[35, 300]);
        handle.connect(id(1)).unwrap();

        sleep_ms(50).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Running);
        assert_eq!(snapshot.generation, 1);

        // 25 ticks of 100ms take 0.10 to 0.35
        sleep_ms(2_500).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Crashed);
        assert_eq!(snapshot.multiplier, Multiplier::from_hundredths(35));
        assert_eq!(
            gateway.broadcasts().last(),
            Some(&GameEvent::GameCrash { crash_point: Multiplier::from_hundredths(35) })
        );

        // No ticks while crashed
        let updates_at_crash = gateway.broadcasts().len();
        sleep_ms(4_000).await;
        assert_eq!(gateway.broadcasts().len(), updates_at_crash);

        // Restart delay is 5s from the crash
        sleep_ms(1_100).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Running);
        assert_eq!(snapshot.generation, 2);

        handle.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bets_flow_through_mailbox() {
        let (handle, _task, gateway) = spawn(&[500]);
        handle.connect(id(1)).unwrap();
        handle.place_bet(id(1), 10.0).unwrap();

        // 0.10 + 90 ticks = 1.00
        sleep_ms(9_050).await;
        handle.cash_out(id(1)).unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.multiplier, Multiplier::ONE);

        let sent = gateway.sent_to(&id(1));
        assert_eq!(
            sent,
            vec![
                GameEvent::BetSuccess { amount: Amount::from_cents(1000) },
                GameEvent::CashOutSuccess { payout: Amount::from_cents(1000) },
            ]
        );

        handle.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_leaves_round_running() {
        let (handle, _task, _gateway) = spawn(&[500]);
        handle.connect(id(1)).unwrap();
        handle.connect(id(2)).unwrap();
        sleep_ms(1_050).await;

        handle.disconnect(id(1)).unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.players, 1);
        assert_eq!(snapshot.phase, EnginePhase::Running);
        assert_eq!(snapshot.multiplier, Multiplier::from_hundredths(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_task() {
        let (handle, task, gateway) = spawn(&[500]);
        handle.connect(id(1)).unwrap();
        sleep_ms(250).await;

        handle.shutdown().unwrap();
        task.await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(handle.connect(id(2)), Err(EngineClosed));
        assert_eq!(handle.snapshot().await, Err(EngineClosed));

        let seen = gateway.broadcasts().len();
        sleep_ms(1_000).await;
        assert_eq!(gateway.broadcasts().len(), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_failure_recovers_on_next_connect() {
        let gateway = Arc::new(RecordingGateway::default());
        let generator = ScriptedGenerator::new(&[]);
        let (handle, _task) = spawn_engine(
            GameConfig::default(),
            Box::new(generator.clone()),
            gateway.clone(),
        );

        handle.connect(id(1)).unwrap();
        sleep_ms(500).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Idle);
        assert!(gateway.broadcasts().is_empty());

        generator.push(Ok(Multiplier::from_hundredths(250)));
        handle.connect(id(2)).unwrap();
        sleep_ms(150).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Running);
        assert_eq!(snapshot.multiplier, Multiplier::from_hundredths(11));
        assert_eq!(gateway.broadcasts()[0], GameEvent::GameStart {});
    }
}
