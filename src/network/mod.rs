//! Network Layer
//!
//! WebSocket server for real-time participant communication.
//! All game rules live in `game/`; this layer only moves frames.

pub mod protocol;
pub mod hub;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ProtocolError, ErrorCode};
pub use hub::{ClientHub, ClientSender};
pub use server::{CrashServer, ServerConfig, ServerError};
