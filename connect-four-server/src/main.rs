//! Connect Four Server
//!
//! Real-time matchmaking and game server.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use connect_four::{
    game::Leaderboard,
    persistence::{GameStore, JsonlGameStore, LogEventSink},
    GameServer, ServerConfig, SessionConfig, SessionManager, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    info!("Connect Four Server v{}", VERSION);

    let mut sessions = SessionManager::new(SessionConfig::default());

    if let Some(path) = &config.store_path {
        match JsonlGameStore::open(path) {
            Ok(store) => {
                match store.load_history() {
                    Ok(history) => {
                        info!(games = history.len(), path = %store.path().display(), "rebuilt leaderboard from history");
                        sessions = sessions.with_leaderboard(Leaderboard::from_history(&history));
                    }
                    Err(e) => warn!(error = %e, "could not read game history, starting empty"),
                }
                sessions = sessions.with_store(Arc::new(store));
            }
            Err(e) => warn!(error = %e, path = %path.display(), "game store unavailable, persistence disabled"),
        }
    }

    if config.event_log {
        sessions = sessions.with_events(Arc::new(LogEventSink));
    }

    let server = Arc::new(GameServer::new(config, sessions));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server failed")?;
    info!("Server stopped");
    Ok(())
}
