//! Game Events
//!
//! Everything the engine tells participants, and the gateway it tells them through.

use serde::{Deserialize, Serialize};

use crate::core::fixed::{Amount, Multiplier};
use crate::game::registry::{BetError, ConnectionId, RejectCode};

/// Message shown to a player whose bet was still riding at the crash.
pub const PLAYER_LOST_MESSAGE: &str = "You lost your bet!";

/// Outbound game event.
///
/// `GameStart` deliberately carries no crash point; it is only revealed by `GameCrash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GameEvent {
    /// A new round began. Sent to all.
    GameStart {},

    /// Current multiplier. Sent to all every tick, and to newcomers mid-round.
    MultiplierUpdate {
        /// Multiplier after this tick.
        multiplier: Multiplier,
    },

    /// The round crashed. Sent to all.
    GameCrash {
        /// Threshold the round reached.
        #[serde(rename = "crashPoint")]
        crash_point: Multiplier,
    },

    /// The recipient's bet was forfeited.
    PlayerLost {
        /// Notice shown to the player.
        message: String,
    },

    /// Bet accepted.
    BetSuccess {
        /// Accepted stake.
        amount: Amount,
    },

    /// Bet refused.
    BetFailed {
        /// Machine-readable reason.
        code: RejectCode,
        /// Human-readable reason.
        message: String,
    },

    /// Cash-out accepted.
    CashOutSuccess {
        /// Stake times the multiplier at cash-out.
        payout: Amount,
    },

    /// Cash-out refused.
    CashOutFailed {
        /// Machine-readable reason.
        code: RejectCode,
        /// Human-readable reason.
        message: String,
    },
}

impl GameEvent {
    /// Bet rejection for `err`.
    pub fn bet_failed(err: &BetError) -> Self {
        GameEvent::BetFailed { code: err.code(), message: err.to_string() }
    }

    /// Cash-out rejection for `err`.
    pub fn cash_out_failed(err: &BetError) -> Self {
        GameEvent::CashOutFailed { code: err.code(), message: err.to_string() }
    }

    /// Forfeit notice.
    pub fn player_lost() -> Self {
        GameEvent::PlayerLost { message: PLAYER_LOST_MESSAGE.to_string() }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::GameStart {} => "gameStart",
            GameEvent::MultiplierUpdate { .. } => "multiplierUpdate",
            GameEvent::GameCrash { .. } => "gameCrash",
            GameEvent::PlayerLost { .. } => "playerLost",
            GameEvent::BetSuccess { .. } => "betSuccess",
            GameEvent::BetFailed { .. } => "betFailed",
            GameEvent::CashOutSuccess { .. } => "cashOutSuccess",
            GameEvent::CashOutFailed { .. } => "cashOutFailed",
        }
    }
}

/// Boundary through which the engine reaches participants.
///
/// Calls must not block: the engine invokes them from inside its handlers.
pub trait BroadcastGateway: Send + Sync {
    /// Deliver to every connected participant.
    fn broadcast(&self, event: GameEvent);

    /// Deliver to one participant. Unknown ids are ignored.
    fn send_to(&self, id: &ConnectionId, event: GameEvent);
}

/// In-memory gateway that records every delivery, for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Where a recorded event went.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Delivery {
        All(GameEvent),
        One(ConnectionId, GameEvent),
    }

    #[derive(Debug, Default)]
    pub struct RecordingGateway {
        deliveries: Mutex<Vec<Delivery>>,
    }

    impl RecordingGateway {
        pub fn take(&self) -> Vec<Delivery> {
            std::mem::take(&mut *self.deliveries.lock().unwrap())
        }

        pub fn broadcasts(&self) -> Vec<GameEvent> {
            self.deliveries
                .lock()
                .unwrap()
                .iter()
                .filter_map(|d| match d {
                    Delivery::All(e) => Some(e.clone()),
                    Delivery::One(..) => None,
                })
                .collect()
        }

        pub fn sent_to(&self, id: &ConnectionId) -> Vec<GameEvent> {
            self.deliveries
                .lock()
                .unwrap()
                .iter()
                .filter_map(|d| match d {
                    Delivery::One(to, e) if to == id => Some(e.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl BroadcastGateway for RecordingGateway {
        fn broadcast(&self, event: GameEvent) {
            self.deliveries.lock().unwrap().push(Delivery::All(event));
        }

        fn send_to(&self, id: &ConnectionId, event: GameEvent) {
            self.deliveries.lock().unwrap().push(Delivery::One(*id, event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_start_withholds_crash_point() {
        let json = serde_json::to_string(&GameEvent::GameStart {}).unwrap();
        assert_eq!(json, r#"{"event":"gameStart"}"#);
    }

    #[test]
    fn test_payload_shapes() {
        let json = serde_json::to_string(&GameEvent::MultiplierUpdate {
            multiplier: Multiplier::from_hundredths(112),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"multiplierUpdate","multiplier":1.12}"#);

        let json = serde_json::to_string(&GameEvent::GameCrash {
            crash_point: Multiplier::from_hundredths(35),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"gameCrash","crashPoint":0.35}"#);

        let json = serde_json::to_string(&GameEvent::CashOutSuccess {
            payout: Amount::from_cents(2000),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"cashOutSuccess","payout":20.0}"#);
    }

    #[test]
    fn test_rejection_carries_code_and_message() {
        let event = GameEvent::bet_failed(&BetError::AlreadyBet);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"betFailed","code":"already_bet","message":"You already placed a bet!"}"#
        );

        let event = GameEvent::cash_out_failed(&BetError::NoActiveBet);
        assert_eq!(event.name(), "cashOutFailed");
    }

    #[test]
    fn test_names_match_wire_tags() {
        let events = vec![
            GameEvent::GameStart {},
            GameEvent::MultiplierUpdate { multiplier: Multiplier::ONE },
            GameEvent::GameCrash { crash_point: Multiplier::ONE },
            GameEvent::player_lost(),
            GameEvent::BetSuccess { amount: Amount::from_cents(1) },
            GameEvent::bet_failed(&BetError::InvalidAmount),
            GameEvent::CashOutSuccess { payout: Amount::from_cents(1) },
            GameEvent::cash_out_failed(&BetError::NotFound),
        ];

        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.name());
            let parsed: GameEvent = serde_json::from_value(value).unwrap();
            assert_eq!(parsed, event);
        }
    }
}
