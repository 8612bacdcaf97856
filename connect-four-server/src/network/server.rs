//! WebSocket Game Server
//!
//! Accepts WebSocket connections and routes join, move and reconnect
//! requests into the session registry. Each connection runs a reader task
//! and a writer task fed by a bounded outbound queue.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::GameId;
use crate::network::hub::{ConnectionHub, ConnectionId};
use crate::network::protocol::{ClientMessage, GameJoinedInfo, MoveMadeInfo, ProtocolError, ServerMessage};
use crate::network::session::{GameNotice, SessionError, SessionManager};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// A connection with no inbound frame for this long is dropped.
    pub read_timeout: Duration,
    /// Keep-alive ping interval.
    pub ping_interval: Duration,
    /// Deadline for a single outbound frame.
    pub write_timeout: Duration,
    /// Outbound queue capacity per connection.
    pub outbound_capacity: usize,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
    /// Finished-game log. Persistence is disabled when unset.
    pub store_path: Option<PathBuf>,
    /// Publish gameplay events to the log.
    pub event_log: bool,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            read_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
            outbound_capacity: 256,
            max_message_size: 512,
            store_path: None,
            event_log: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    /// Variable name.
    pub key: &'static str,
    /// Offending value.
    pub value: String,
}

impl ServerConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`.
    ///
    /// `BIND_ADDR` wins over `PORT`. `GAME_STORE_PATH` enables persistence
    /// and `EVENT_LOG` toggles the event log.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            let port: u16 = port.trim().parse().map_err(|_| ConfigError { key: "PORT", value: port })?;
            config.bind_addr.set_port(port);
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr
                .trim()
                .parse()
                .map_err(|_| ConfigError { key: "BIND_ADDR", value: addr })?;
        }
        if let Some(path) = lookup("GAME_STORE_PATH").filter(|p| !p.trim().is_empty()) {
            config.store_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup("EVENT_LOG") {
            config.event_log = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(ConfigError { key: "EVENT_LOG", value: flag }),
            };
        }

        Ok(config)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Shared handles for one connection's tasks.
#[derive(Clone)]
struct ConnectionContext {
    sessions: Arc<SessionManager>,
    hub: Arc<ConnectionHub>,
    config: ServerConfig,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session registry.
    sessions: Arc<SessionManager>,
    /// Live connections.
    hub: Arc<ConnectionHub>,
    /// Registry notices, taken by the first `serve`.
    notices: Mutex<Option<mpsc::UnboundedReceiver<GameNotice>>>,
    /// Accepted connections not yet torn down.
    active: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server around a session registry.
    pub fn new(config: ServerConfig, sessions: SessionManager) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        Self {
            config,
            sessions: Arc::new(sessions.with_notices(notice_tx)),
            hub: Arc::new(ConnectionHub::new()),
            notices: Mutex::new(Some(notice_rx)),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from `listener` until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(version = %self.config.version, "Game server listening on {}", listener.local_addr()?);

        let sweep_handle = tokio::spawn(Arc::clone(&self.sessions).run_sweep_loop(self.shutdown_tx.subscribe()));
        let notice_handle = self.spawn_notice_loop().await;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if let Err(e) = self.check_capacity() {
                                warn!("{}, rejecting {}", e, addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
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

        sweep_handle.abort();
        if let Some(handle) = notice_handle {
            handle.abort();
        }

        Ok(())
    }

    fn check_capacity(&self) -> Result<(), GameServerError> {
        if self.active.load(Ordering::Acquire) >= self.config.max_connections {
            return Err(GameServerError::ConnectionLimitReached);
        }
        Ok(())
    }

    fn context(&self) -> ConnectionContext {
        ConnectionContext {
            sessions: Arc::clone(&self.sessions),
            hub: Arc::clone(&self.hub),
            config: self.config.clone(),
        }
    }

    async fn spawn_notice_loop(&self) -> Option<tokio::task::JoinHandle<()>> {
        let rx = self.notices.lock().await.take()?;
        Some(tokio::spawn(Self::run_notice_loop(rx, Arc::clone(&self.hub))))
    }

    /// Relay registry-driven changes to the game's connections.
    async fn run_notice_loop(mut rx: mpsc::UnboundedReceiver<GameNotice>, hub: Arc<ConnectionHub>) {
        while let Some(notice) = rx.recv().await {
            match notice {
                GameNotice::ScriptedOpponentJoined(game) => {
                    let game_id = game.id.clone();
                    hub.broadcast_to_game(&game_id, &ServerMessage::GameStarted(game)).await;
                }
                GameNotice::Evicted(game_id) => hub.forget_game(&game_id).await,
            }
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = self.context();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::AcqRel);

        tokio::spawn(async move {
            if let Err(e) = Self::serve_connection(stream, ctx, shutdown_rx).await {
                debug!("Connection {} ended: {}", addr, e);
            }
            active.fetch_sub(1, Ordering::AcqRel);
            debug!("Client {} cleaned up", addr);
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        ctx: ConnectionContext,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        let ws_config = WebSocketConfig {
            max_message_size: Some(ctx.config.max_message_size),
            max_frame_size: Some(ctx.config.max_message_size),
            ..Default::default()
        };
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(ctx.config.outbound_capacity.max(1));
        let (conn_id, kill) = ctx.hub.register(msg_tx).await;

        let ping_interval = ctx.config.ping_interval;
        let write_timeout = ctx.config.write_timeout;
        let mut writer = tokio::spawn(async move {
            let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
            loop {
                let frame = tokio::select! {
                    msg = msg_rx.recv() => match msg {
                        Some(msg) => match msg.to_json() {
                            Ok(text) => Message::Text(text),
                            Err(e) => {
                                error!("Failed to serialize message: {}", e);
                                continue;
                            }
                        },
                        None => break,
                    },
                    _ = ping.tick() => Message::Ping(Vec::new()),
                };

                match timeout(write_timeout, ws_sender.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(conn_id, "write failed: {}", e);
                        break;
                    }
                    Err(_) => {
                        debug!(conn_id, "write timed out");
                        break;
                    }
                }
            }
            let _ = ws_sender.close().await;
        });

        let read_timeout = ctx.config.read_timeout;
        loop {
            tokio::select! {
                frame = timeout(read_timeout, ws_receiver.next()) => {
                    match frame {
                        Ok(Some(Ok(Message::Text(text)))) => {
                            Self::dispatch(&ctx, conn_id, &text).await;
                        }
                        Ok(Some(Ok(Message::Binary(data)))) => match String::from_utf8(data) {
                            Ok(text) => Self::dispatch(&ctx, conn_id, &text).await,
                            Err(_) => {
                                ctx.hub.send_to(conn_id, ServerMessage::error(ProtocolError::InvalidFormat)).await;
                            }
                        },
                        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                            debug!(conn_id, "client disconnected");
                            break;
                        }
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => {
                            debug!(conn_id, "read failed: {}", e);
                            break;
                        }
                        Err(_) => {
                            debug!(conn_id, "read idle timeout");
                            break;
                        }
                    }
                }
                _ = kill.notified() => {
                    debug!(conn_id, "dropped by hub");
                    break;
                }
                _ = &mut writer => break,
                _ = shutdown_rx.recv() => break,
            }
        }

        ctx.hub.unregister(conn_id).await;
        writer.abort();
        Ok(())
    }

    /// Parse one inbound message and route it. Failures are reported to the
    /// sender only.
    async fn dispatch(ctx: &ConnectionContext, conn_id: ConnectionId, text: &str) {
        let message = match ClientMessage::from_json(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(conn_id, "Invalid message: {}", e);
                ctx.hub.send_to(conn_id, ServerMessage::error(e)).await;
                return;
            }
        };

        let result = match message {
            ClientMessage::JoinGame { username, game_id } => {
                Self::handle_join(ctx, conn_id, &username, game_id.as_deref()).await
            }
            ClientMessage::MakeMove { column } => Self::handle_move(ctx, conn_id, column).await,
            ClientMessage::Reconnect { game_id, username } => {
                Self::handle_reconnect(ctx, conn_id, &game_id, &username).await
            }
        };

        if let Err(e) = result {
            debug!(conn_id, "Request rejected: {}", e);
            ctx.hub.send_to(conn_id, ServerMessage::error(e)).await;
        }
    }

    async fn handle_join(
        ctx: &ConnectionContext,
        conn_id: ConnectionId,
        username: &str,
        game_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let outcome = match game_id {
            Some(id) => ctx.sessions.join_specific(username, id).await?,
            None => ctx.sessions.find_or_create(username).await?,
        };

        let game_id = outcome.game.id.clone();
        ctx.hub.associate(conn_id, &outcome.game, &outcome.player.username).await;
        ctx.hub.send_to(conn_id, ServerMessage::GameJoined(GameJoinedInfo {
            game: outcome.game.clone(),
            player: outcome.player,
            is_waiting: outcome.is_waiting,
        })).await;

        // A pairing may have landed between the join and the association
        let latest = ctx.sessions.get_game(&game_id).await.unwrap_or(outcome.game);
        ctx.hub.broadcast_to_game(&game_id, &ServerMessage::game_state(latest)).await;
        Ok(())
    }

    async fn handle_move(ctx: &ConnectionContext, conn_id: ConnectionId, column: usize) -> Result<(), SessionError> {
        let (game_id, username) = ctx
            .hub
            .association(conn_id)
            .await
            .ok_or(SessionError::GameNotFound)?;

        let (mv, game) = ctx.sessions.apply_player_move(&game_id, column, &username).await?;
        let scripted_reply = game.is_scripted_turn();
        ctx.hub.broadcast_to_game(&game_id, &ServerMessage::MoveMade(MoveMadeInfo { mv, game })).await;

        if scripted_reply {
            Self::schedule_scripted_reply(ctx, game_id);
        }
        Ok(())
    }

    fn schedule_scripted_reply(ctx: &ConnectionContext, game_id: GameId) {
        let sessions = Arc::clone(&ctx.sessions);
        let hub = Arc::clone(&ctx.hub);
        let delay = sessions.config().scripted_move_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match sessions.apply_scripted_move(&game_id).await {
                Ok(Some((mv, game))) => {
                    hub.broadcast_to_game(&game_id, &ServerMessage::MoveMade(MoveMadeInfo { mv, game })).await;
                }
                Ok(None) => {}
                Err(e) => debug!(game_id = %game_id, "scripted move skipped: {}", e),
            }
        });
    }

    async fn handle_reconnect(
        ctx: &ConnectionContext,
        conn_id: ConnectionId,
        game_id: &str,
        username: &str,
    ) -> Result<(), SessionError> {
        let game = ctx.sessions.reconnect(game_id, username).await?;
        ctx.hub.associate(conn_id, &game, username).await;
        info!(game_id = %game.id, player = %username, "player reconnected");
        ctx.hub.send_to(conn_id, ServerMessage::GameReconnected(game)).await;
        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get registered connection count.
    pub async fn connection_count(&self) -> usize {
        self.hub.connection_count().await
    }

    /// Get live game count.
    pub async fn game_count(&self) -> usize {
        self.sessions.game_count().await
    }

    /// Player waiting in the matchmaking slot.
    pub async fn queued_player(&self) -> Option<String> {
        self.sessions.queued_player().await
    }
}
