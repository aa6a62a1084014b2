//! Crash Game Server
//!
//! Binds the WebSocket listener, starts the round engine and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crash_game::{
    spawn_engine, ClientHub, CrashServer, GameConfig, RandomCrashGenerator, ServerConfig, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let game_config = GameConfig::from_env().context("invalid game configuration")?;
    let server_config = ServerConfig::from_env().context("invalid server configuration")?;

    info!("Crash Server v{}", VERSION);
    info!(
        "Multiplier {} +{} every {:?}, crash range [{}, {}), restart after {:?}",
        game_config.base_multiplier,
        game_config.tick_increment,
        game_config.tick_interval,
        game_config.base_multiplier,
        game_config.crash_upper_bound,
        game_config.restart_delay,
    );

    let hub = Arc::new(ClientHub::new());
    let generator = RandomCrashGenerator::from_config(&game_config);
    let (engine, engine_task) = spawn_engine(game_config, Box::new(generator), hub.clone());

    let server = Arc::new(CrashServer::new(server_config, engine.clone(), hub));
    let running = server.clone();
    let mut server_task = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut server_task => {
            engine.shutdown().ok();
            let _ = engine_task.await;
            return match result {
                Ok(inner) => inner.context("server stopped"),
                Err(e) => Err(e).context("server task panicked"),
            };
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
        }
    }

    server.shutdown();
    let _ = server_task.await;
    engine.shutdown().ok();
    let _ = engine_task.await;

    // Give connection tasks a moment to flush shutdown notices
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    info!("Server stopped");
    Ok(())
}
