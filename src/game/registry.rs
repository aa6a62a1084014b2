//! Player Registry
//!
//! Connected participants and their per-round wager state.
//! Every mutation of a player's bet goes through these methods, so the
//! wager invariants live in one place. Uses BTreeMap for deterministic
//! iteration order at settlement.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fixed::{Amount, Multiplier};

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Unique connection identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub [u8; 16]);

impl ConnectionId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Short hex form for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Wager state of one connected participant for the current round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Player {
    /// Current stake. Zero means no active bet.
    pub bet_amount: Amount,
    /// Whether this player already cashed out this round.
    pub cashed_out: bool,
}

impl Player {
    /// Stake placed and still riding.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.bet_amount.is_zero() && !self.cashed_out
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why a bet or cash-out was refused. Always scoped to the requesting player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BetError {
    /// Amount is zero, negative or not a number.
    #[error("Bet amount must be a positive number.")]
    InvalidAmount,

    /// Player already has a bet this round.
    #[error("You already placed a bet!")]
    AlreadyBet,

    /// No bet riding, or already cashed out.
    #[error("Unable to cash out: no active bet.")]
    NoActiveBet,

    /// Unknown connection.
    #[error("Player not found.")]
    NotFound,

    /// No round in progress.
    #[error("Game not running. Wait for the next round.")]
    GameNotRunning,
}

/// Stable machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    /// See [`BetError::InvalidAmount`].
    InvalidAmount,
    /// See [`BetError::AlreadyBet`].
    AlreadyBet,
    /// See [`BetError::NoActiveBet`].
    NoActiveBet,
    /// See [`BetError::NotFound`].
    NotFound,
    /// See [`BetError::GameNotRunning`].
    GameNotRunning,
}

impl BetError {
    /// Wire code for this rejection.
    pub fn code(&self) -> RejectCode {
        match self {
            BetError::InvalidAmount => RejectCode::InvalidAmount,
            BetError::AlreadyBet => RejectCode::AlreadyBet,
            BetError::NoActiveBet => RejectCode::NoActiveBet,
            BetError::NotFound => RejectCode::NotFound,
            BetError::GameNotRunning => RejectCode::GameNotRunning,
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Keyed container of connected players.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<ConnectionId, Player>,
}

impl PlayerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { players: BTreeMap::new() }
    }

    /// Add a player with no bet. Re-registering resets the entry.
    pub fn register(&mut self, id: ConnectionId) {
        self.players.insert(id, Player::default());
    }

    /// Remove a player.
    pub fn unregister(&mut self, id: &ConnectionId) -> Result<Player, BetError> {
        self.players.remove(id).ok_or(BetError::NotFound)
    }

    /// Clear every bet and cash-out flag.
    pub fn reset_all_for_new_round(&mut self) {
        for player in self.players.values_mut() {
            *player = Player::default();
        }
    }

    /// Record a wager.
    pub fn place_bet(&mut self, id: &ConnectionId, amount: Amount) -> Result<(), BetError> {
        let player = self.players.get_mut(id).ok_or(BetError::NotFound)?;

        if !player.bet_amount.is_zero() {
            return Err(BetError::AlreadyBet);
        }
        if amount.is_zero() {
            return Err(BetError::InvalidAmount);
        }

        player.bet_amount = amount;
        player.cashed_out = false;
        Ok(())
    }

    /// Lock in the payout at `multiplier`.
    pub fn cash_out(&mut self, id: &ConnectionId, multiplier: Multiplier) -> Result<Amount, BetError> {
        let player = self.players.get_mut(id).ok_or(BetError::NotFound)?;

        if !player.is_active() {
            return Err(BetError::NoActiveBet);
        }

        player.cashed_out = true;
        Ok(player.bet_amount.scale(multiplier))
    }

    /// Ids still riding a bet, in ascending id order. Computed fresh each call.
    pub fn active_losers(&self) -> Vec<ConnectionId> {
        self.players
            .iter()
            .filter(|(_, p)| p.is_active())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Zero a player's stake after the round crashed on them.
    /// Returns the forfeited amount.
    pub fn forfeit(&mut self, id: &ConnectionId) -> Result<Amount, BetError> {
        let player = self.players.get_mut(id).ok_or(BetError::NotFound)?;
        let lost = player.bet_amount;
        player.bet_amount = Amount::ZERO;
        Ok(lost)
    }

    /// Look up a player.
    pub fn get(&self, id: &ConnectionId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.players.contains_key(id)
    }

    /// Number of registered players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of bets still riding.
    pub fn active_bet_count(&self) -> usize {
        self.players.values().filter(|p| p.is_active()).count()
    }
}
