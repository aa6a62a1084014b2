//! Game Logic Module
//!
//! Round lifecycle, wagers and the events they produce.
//!
//! ## Module Structure
//!
//! - `config`: Tunables and environment loading
//! - `crash`: Crash point generation
//! - `clock`: Periodic tick source
//! - `registry`: Connected players and their bets
//! - `round`: Live round state
//! - `events`: Outbound events and the gateway trait
//! - `engine`: Round state machine
//! - `driver`: Tokio task hosting the engine

pub mod config;
pub mod crash;
pub mod clock;
pub mod registry;
pub mod round;
pub mod events;
pub mod engine;
pub mod driver;

// Re-export key types
pub use config::{ConfigError, GameConfig};
pub use crash::{CrashPointGenerator, GeneratorError, RandomCrashGenerator};
pub use clock::RoundClock;
pub use registry::{BetError, ConnectionId, Player, PlayerRegistry, RejectCode};
pub use round::{EnginePhase, Round};
pub use events::{BroadcastGateway, GameEvent};
pub use engine::{CrashReport, EngineError, EngineSnapshot, RoundEngine, RoundScheduler, TickOutcome};
pub use driver::{spawn_engine, EngineClosed, EngineCommand, EngineHandle, TokioScheduler};
