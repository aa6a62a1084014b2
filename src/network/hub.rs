//! Client Hub
//!
//! Maps connection ids to their outbound queues. This is the engine's
//! [`BroadcastGateway`]: events are wrapped in [`ServerMessage::Event`] and
//! pushed onto each connection's sender task without blocking.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::events::{BroadcastGateway, GameEvent};
use crate::game::registry::ConnectionId;
use crate::network::protocol::ServerMessage;

/// Outbound queue of one connection.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// Registry of live connection queues.
#[derive(Debug, Default)]
pub struct ClientHub {
    clients: RwLock<BTreeMap<ConnectionId, ClientSender>>,
}

impl ClientHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection's outbound queue.
    pub fn attach(&self, id: ConnectionId, sender: ClientSender) {
        match self.clients.write() {
            Ok(mut clients) => {
                clients.insert(id, sender);
            }
            Err(_) => warn!("Client hub lock poisoned; dropping attach for {}", id),
        }
    }

    /// Detach a connection. Returns whether it was attached.
    pub fn detach(&self, id: &ConnectionId) -> bool {
        match self.clients.write() {
            Ok(mut clients) => clients.remove(id).is_some(),
            Err(_) => false,
        }
    }

    /// Number of attached connections.
    pub fn len(&self) -> usize {
        self.clients.read().map(|c| c.len()).unwrap_or(0)
    }

    /// True when nobody is attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a raw message to everyone.
    pub fn send_all(&self, message: ServerMessage) {
        let Ok(clients) = self.clients.read() else {
            return;
        };
        for (id, sender) in clients.iter() {
            if sender.send(message.clone()).is_err() {
                debug!("Dropped message for closed connection {}", id);
            }
        }
    }

    /// Push a raw message to one connection. Unknown ids are ignored.
    pub fn send_one(&self, id: &ConnectionId, message: ServerMessage) {
        let Ok(clients) = self.clients.read() else {
            return;
        };
        match clients.get(id) {
            Some(sender) => {
                if sender.send(message).is_err() {
                    debug!("Dropped message for closed connection {}", id);
                }
            }
            None => debug!("No connection {} to deliver to", id),
        }
    }
}

impl BroadcastGateway for ClientHub {
    fn broadcast(&self, event: GameEvent) {
        self.send_all(ServerMessage::Event(event));
    }

    fn send_to(&self, id: &ConnectionId, event: GameEvent) {
        self.send_one(id, ServerMessage::Event(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::Multiplier;

    fn id(n: u8) -> ConnectionId {
        ConnectionId::new([n; 16])
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let hub = ClientHub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.attach(id(1), tx1);
        hub.attach(id(2), tx2);

        hub.broadcast(GameEvent::GameStart {});

        assert_eq!(rx1.try_recv().unwrap(), ServerMessage::Event(GameEvent::GameStart {}));
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::Event(GameEvent::GameStart {}));
    }

    #[test]
    fn test_send_to_is_private() {
        let hub = ClientHub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.attach(id(1), tx1);
        hub.attach(id(2), tx2);

        hub.send_to(&id(2), GameEvent::player_lost());

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::Event(GameEvent::player_lost()));

        // Unknown id is a no-op
        hub.send_to(&id(9), GameEvent::player_lost());
    }

    #[test]
    fn test_detach_and_closed_receivers() {
        let hub = ClientHub::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.attach(id(1), tx1);
        hub.attach(id(2), tx2);
        assert_eq!(hub.len(), 2);

        // A dropped receiver does not disturb others
        drop(rx1);
        let update = GameEvent::MultiplierUpdate { multiplier: Multiplier::ONE };
        hub.broadcast(update.clone());
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::Event(update));

        assert!(hub.detach(&id(1)));
        assert!(!hub.detach(&id(1)));
        assert_eq!(hub.len(), 1);
        assert!(!hub.is_empty());
    }
}
