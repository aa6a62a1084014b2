//! # Crash Game Server
//!
//! Authoritative round server for a multiplayer crash betting game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CRASH GAME SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── fixed.rs    - Hundredths multiplier and cent amounts    │
//! │  └── rng.rs      - Xorshift128+ PRNG and seed derivation     │
//! │                                                              │
//! │  game/           - Round logic                               │
//! │  ├── config.rs   - Tunables                                  │
//! │  ├── crash.rs    - Crash point generation                    │
//! │  ├── clock.rs    - Periodic tick source                      │
//! │  ├── registry.rs - Players and bets                          │
//! │  ├── round.rs    - Live round state                          │
//! │  ├── events.rs   - Outbound events, gateway trait            │
//! │  ├── engine.rs   - Round state machine                       │
//! │  └── driver.rs   - Engine task and mailbox                   │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── hub.rs      - Per-connection outbound queues            │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money
//!
//! Multipliers and amounts are integers (hundredths and cents), so the
//! multiplier lands exactly on every crash point and payouts never drift.
//! Floats appear only at the JSON boundary.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::fixed::{Amount, Multiplier};
pub use crate::core::rng::DeterministicRng;
pub use game::{
    spawn_engine, BetError, ConnectionId, EngineHandle, GameConfig, GameEvent, RandomCrashGenerator,
    RoundEngine,
};
pub use network::{ClientHub, CrashServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
