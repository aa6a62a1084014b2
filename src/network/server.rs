//! WebSocket Game Server
//!
//! Async WebSocket server for crash game participants.
//! Each connection gets an id, an outbound queue in the [`ClientHub`] and a
//! reader loop that forwards requests into the engine mailbox.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::config::ConfigError;
use crate::game::driver::{EngineClosed, EngineHandle};
use crate::game::registry::ConnectionId;
use crate::network::hub::ClientHub;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};

/// Port variable.
pub const ENV_PORT: &str = "PORT";
/// Connection limit variable.
pub const ENV_MAX_CONNECTIONS: &str = "CRASH_MAX_CONNECTIONS";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// How long a closing connection may spend flushing its queue.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `PORT` and `CRASH_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_PORT) {
            let port = raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue { key: ENV_PORT, value: raw.clone() })?;
            config.bind_addr.set_port(port);
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = raw.trim().parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue { key: ENV_MAX_CONNECTIONS, value: raw.clone() }
            })?;
        }

        Ok(config)
    }
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Engine task is gone.
    #[error("Engine unavailable: {0}")]
    Engine(#[from] EngineClosed),
}

/// The crash game server.
pub struct CrashServer {
    /// Server configuration.
    config: ServerConfig,
    /// Outbound queues, shared with the engine as its gateway.
    hub: Arc<ClientHub>,
    /// Engine mailbox.
    engine: EngineHandle,
    /// Open connections, counted from accept to cleanup.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl CrashServer {
    /// Create a server feeding `engine` and delivering through `hub`.
    ///
    /// `hub` must be the gateway the engine was spawned with.
    pub fn new(config: ServerConfig, engine: EngineHandle, hub: Arc<ClientHub>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            hub,
            engine,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("Crash server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                Self::reject_connection(stream, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Complete the handshake only to tell the client we are full, then close.
    fn reject_connection(stream: TcpStream, addr: SocketAddr) {
        tokio::spawn(async move {
            let mut ws_stream = match tokio::time::timeout(FLUSH_TIMEOUT, accept_async(stream)).await {
                Ok(Ok(ws)) => ws,
                _ => {
                    debug!("Dropped over-limit connection {} before handshake", addr);
                    return;
                }
            };

            let notice = ServerMessage::error(ErrorCode::ServerOverloaded, "Server is full");
            if let Ok(text) = notice.to_json() {
                let _ = ws_stream.send(Message::Text(text)).await;
            }
            let _ = ws_stream.close(None).await;
        });
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = self.hub.clone();
        let engine = self.engine.clone();
        let connections = self.connections.clone();
        let version = self.config.version.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let id = ConnectionId::random();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<ServerMessage>();

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let _ = msg_tx.send(ServerMessage::Welcome {
                connection_id: id.to_uuid_string(),
                server_version: version,
            });

            // Attach before the engine hears about us so the first event reaches us
            hub.attach(id, msg_tx.clone());
            if engine.connect(id).is_err() {
                warn!("Engine unavailable, closing {}", addr);
                let _ = msg_tx.send(ServerMessage::error(
                    ErrorCode::InternalError,
                    "Game engine unavailable",
                ));
            } else {
                debug!("Client {} is player {}", addr, id);

                // Handle incoming messages
                loop {
                    tokio::select! {
                        msg = ws_receiver.next() => {
                            let decoded = match msg {
                                Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text)
                                    .map_err(|e| e.to_string()),
                                Some(Ok(Message::Binary(data))) => ClientMessage::from_bytes(&data)
                                    .map_err(|e| e.to_string()),
                                Some(Ok(Message::Close(_))) | None => {
                                    debug!("Client {} disconnected", addr);
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!("WebSocket error for {}: {}", addr, e);
                                    break;
                                }
                                // Ping/pong frames are answered by tungstenite
                                Some(Ok(_)) => continue,
                            };

                            match decoded {
                                Ok(client_msg) => {
                                    if Self::handle_client_message(id, client_msg, &engine, &msg_tx).is_err() {
                                        warn!("Engine stopped while serving {}", addr);
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx.send(ServerMessage::error(
                                        ErrorCode::InvalidMessage,
                                        "Invalid message format",
                                    ));
                                }
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            let _ = msg_tx.send(ServerMessage::Shutdown {
                                reason: "Server shutting down".to_string(),
                            });
                            break;
                        }
                    }
                }
            }

            // Cleanup
            hub.detach(&id);
            let _ = engine.disconnect(id);
            drop(msg_tx);

            // Let queued frames (shutdown notice included) drain
            if tokio::time::timeout(FLUSH_TIMEOUT, sender_task).await.is_err() {
                debug!("Sender for {} did not drain in time", addr);
            }

            connections.fetch_sub(1, Ordering::SeqCst);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Route a decoded client message.
    fn handle_client_message(
        id: ConnectionId,
        msg: ClientMessage,
        engine: &EngineHandle,
        sender: &mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<(), EngineClosed> {
        match msg {
            ClientMessage::PlaceBet { amount } => engine.place_bet(id, amount),
            ClientMessage::CashOut => engine.cash_out(id),
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::pong(timestamp));
                Ok(())
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::Amount;
    use crate::game::config::GameConfig;
    use crate::game::driver::spawn_engine;
    use crate::game::engine::testing::ScriptedGenerator;
    use crate::game::events::GameEvent;
    use crate::game::registry::BetError;
    use tokio_tungstenite::connect_async;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_server_config_from_lookup() {
        let config = ServerConfig::from_lookup(|key: &str| match key {
            "PORT" => Some("8081".to_string()),
            "CRASH_MAX_CONNECTIONS" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8081);
        assert_eq!(config.max_connections, 2);

        let err = ServerConfig::from_lookup(|key: &str| {
            (key == "PORT").then(|| "eighty".to_string())
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidValue { key: ENV_PORT, value: "eighty".to_string() });
    }

    async fn start_server(points: &[u32]) -> (Arc<CrashServer>, EngineHandle, SocketAddr) {
        start_server_with_limit(points, ServerConfig::default().max_connections).await
    }

    async fn start_server_with_limit(
        points: &[u32],
        max_connections: usize,
    ) -> (Arc<CrashServer>, EngineHandle, SocketAddr) {
        let hub = Arc::new(ClientHub::new());
        let (engine, _task) = spawn_engine(
            GameConfig::default(),
            Box::new(ScriptedGenerator::new(points)),
            hub.clone(),
        );
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_connections,
            ..Default::default()
        };
        let server = Arc::new(CrashServer::new(config, engine.clone(), hub));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        (server, engine, addr)
    }

    /// Read frames until one satisfies `want`, skipping multiplier updates and the like.
    async fn next_matching<S, F>(ws: &mut S, want: F) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
        F: Fn(&ServerMessage) -> bool,
    {
        let read = async {
            loop {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    let msg = ServerMessage::from_json(&text).unwrap();
                    if want(&msg) {
                        return msg;
                    }
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read).await.unwrap()
    }

    #[tokio::test]
    async fn test_connect_bet_and_cash_out() {
        let (server, engine, addr) = start_server(&[500]).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let welcome = next_matching(&mut ws, |m| matches!(m, ServerMessage::Welcome { .. })).await;
        if let ServerMessage::Welcome { server_version, .. } = welcome {
            assert_eq!(server_version, env!("CARGO_PKG_VERSION"));
        }
        next_matching(&mut ws, |m| *m == ServerMessage::Event(GameEvent::GameStart {})).await;

        let bet = ClientMessage::PlaceBet { amount: 10.0 }.to_json().unwrap();
        ws.send(Message::Text(bet)).await.unwrap();
        let reply = next_matching(&mut ws, |m| {
            matches!(m, ServerMessage::Event(GameEvent::BetSuccess { .. } | GameEvent::BetFailed { .. }))
        })
        .await;
        assert_eq!(
            reply,
            ServerMessage::Event(GameEvent::BetSuccess { amount: Amount::from_cents(1000) })
        );

        // Second bet in the same round is refused
        let bet = ClientMessage::PlaceBet { amount: 5.0 }.to_bytes().unwrap();
        ws.send(Message::Binary(bet)).await.unwrap();
        let reply = next_matching(&mut ws, |m| {
            matches!(m, ServerMessage::Event(GameEvent::BetFailed { .. }))
        })
        .await;
        assert_eq!(reply, ServerMessage::Event(GameEvent::bet_failed(&BetError::AlreadyBet)));

        ws.send(Message::Text(r#"{"type":"cashOut"}"#.to_string())).await.unwrap();
        let reply = next_matching(&mut ws, |m| {
            matches!(m, ServerMessage::Event(GameEvent::CashOutSuccess { .. }))
        })
        .await;
        if let ServerMessage::Event(GameEvent::CashOutSuccess { payout }) = reply {
            // Cashed out somewhere at or above the 0.10 base
            assert!(payout >= Amount::from_cents(100));
        }

        assert_eq!(server.connection_count(), 1);
        server.shutdown();
        engine.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error() {
        let (server, engine, addr) = start_server(&[500]).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        ws.send(Message::Text("{\"type\":\"teleport\"}".to_string())).await.unwrap();
        let reply = next_matching(&mut ws, |m| matches!(m, ServerMessage::Error(_))).await;
        assert_eq!(
            reply,
            ServerMessage::error(ErrorCode::InvalidMessage, "Invalid message format")
        );

        ws.send(Message::Text(r#"{"type":"ping","timestamp":99}"#.to_string())).await.unwrap();
        let reply = next_matching(&mut ws, |m| matches!(m, ServerMessage::Pong { .. })).await;
        assert!(matches!(reply, ServerMessage::Pong { timestamp: 99, .. }));

        server.shutdown();
        engine.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_over_limit_client_told_server_is_full() {
        let (server, engine, addr) = start_server_with_limit(&[500], 1).await;
        let (mut first, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        next_matching(&mut first, |m| matches!(m, ServerMessage::Welcome { .. })).await;

        let (mut second, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let reply = next_matching(&mut second, |m| matches!(m, ServerMessage::Error(_))).await;
        assert_eq!(reply, ServerMessage::error(ErrorCode::ServerOverloaded, "Server is full"));

        assert_eq!(server.connection_count(), 1);
        assert_eq!(engine.snapshot().await.unwrap().players, 1);

        server.shutdown();
        engine.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_notifies_clients() {
        let (server, engine, addr) = start_server(&[500]).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        next_matching(&mut ws, |m| matches!(m, ServerMessage::Welcome { .. })).await;

        server.shutdown();
        let notice = next_matching(&mut ws, |m| matches!(m, ServerMessage::Shutdown { .. })).await;
        assert_eq!(
            notice,
            ServerMessage::Shutdown { reason: "Server shutting down".to_string() }
        );

        engine.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_player() {
        let (server, engine, addr) = start_server(&[500]).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        next_matching(&mut ws, |m| *m == ServerMessage::Event(GameEvent::GameStart {})).await;
        assert_eq!(engine.snapshot().await.unwrap().players, 1);

        ws.close(None).await.unwrap();
        drop(ws);

        let drained = async {
            while engine.snapshot().await.unwrap().players != 0 || server.connection_count() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), drained).await.unwrap();

        server.shutdown();
        engine.shutdown().unwrap();
    }
}
