//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Text frames carry JSON; binary frames carry the same client messages
//! encoded with bincode.

use serde::{Deserialize, Serialize};

use crate::game::events::GameEvent;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Wager on the running round.
    PlaceBet {
        /// Stake in currency units.
        amount: f64,
    },

    /// Lock in the current multiplier.
    CashOut,

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },
}

/// Binary frame layout. bincode cannot decode internally tagged enums, so
/// binary frames use serde's default external tagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum BinaryClientMessage {
    PlaceBet { amount: f64 },
    CashOut,
    Ping { timestamp: u64 },
}

impl From<&ClientMessage> for BinaryClientMessage {
    fn from(msg: &ClientMessage) -> Self {
        match *msg {
            ClientMessage::PlaceBet { amount } => BinaryClientMessage::PlaceBet { amount },
            ClientMessage::CashOut => BinaryClientMessage::CashOut,
            ClientMessage::Ping { timestamp } => BinaryClientMessage::Ping { timestamp },
        }
    }
}

impl From<BinaryClientMessage> for ClientMessage {
    fn from(msg: BinaryClientMessage) -> Self {
        match msg {
            BinaryClientMessage::PlaceBet { amount } => ClientMessage::PlaceBet { amount },
            BinaryClientMessage::CashOut => ClientMessage::CashOut,
            BinaryClientMessage::Ping { timestamp } => ClientMessage::Ping { timestamp },
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First frame on every connection.
    #[serde(rename_all = "camelCase")]
    Welcome {
        /// Identifier assigned to this connection.
        connection_id: String,
        /// Server version.
        server_version: String,
    },

    /// Game event notification.
    Event(GameEvent),

    /// Pong response.
    #[serde(rename_all = "camelCase")]
    Pong {
        /// Echo of the client timestamp.
        timestamp: u64,
        /// Server wall clock in milliseconds since the epoch.
        server_time: i64,
    },

    /// Error message.
    Error(ProtocolError),

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Transport-level error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Transport-level error codes. Game rejections travel as events instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded.
    InvalidMessage,
    /// Server is at capacity.
    ServerOverloaded,
    /// Something went wrong on our side.
    InternalError,
}

impl ServerMessage {
    /// Pong carrying the current server time.
    pub fn pong(timestamp: u64) -> Self {
        ServerMessage::Pong {
            timestamp,
            server_time: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ProtocolError { code, message: message.into() })
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to a binary frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&BinaryClientMessage::from(self))
    }

    /// Deserialize from a binary frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize::<BinaryClientMessage>(data).map(Into::into)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
