//! Connection Hub
//!
//! Tracks live connections and which game each one follows. Delivery never
//! blocks: a connection whose outbound queue is full or closed is torn down.
//!
//! Game-state broadcasts are ordered per game. A snapshot older than one the
//! hub has already delivered or associated for that game is dropped, so a
//! follower never sees a game move backwards.
//!
//! The hub lock is never held while calling into the session registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, warn};

use crate::game::state::{Game, GameId};
use crate::network::protocol::ServerMessage;

/// Connection identifier, unique for the life of the process.
pub type ConnectionId = u64;

/// Per-connection state held by the hub.
#[derive(Debug)]
struct ConnectionHandle {
    sender: mpsc::Sender<ServerMessage>,
    game_id: Option<GameId>,
    username: Option<String>,
    kill: Arc<Notify>,
}

#[derive(Debug, Default)]
struct HubState {
    next_id: ConnectionId,
    connections: BTreeMap<ConnectionId, ConnectionHandle>,
    games: BTreeMap<GameId, Vec<ConnectionId>>,
    latest: BTreeMap<GameId, (u8, usize)>,
}

impl HubState {
    fn detach(&mut self, conn_id: ConnectionId, game_id: &str) {
        if let Some(members) = self.games.get_mut(game_id) {
            members.retain(|&id| id != conn_id);
            if members.is_empty() {
                self.games.remove(game_id);
            }
        }
    }

    fn drop_connection(&mut self, conn_id: ConnectionId) -> bool {
        let Some(handle) = self.connections.remove(&conn_id) else {
            return false;
        };
        if let Some(game_id) = &handle.game_id {
            self.detach(conn_id, game_id);
        }
        handle.kill.notify_one();
        true
    }

    /// Record `game` as seen. False if a later state was already recorded.
    fn advance(&mut self, game: &Game) -> bool {
        let progress = game.progress();
        let latest = self.latest.entry(game.id.clone()).or_insert(progress);
        if progress < *latest {
            return false;
        }
        *latest = progress;
        true
    }
}

/// Registry of live connections and their game associations.
#[derive(Debug, Default)]
pub struct ConnectionHub {
    state: RwLock<HubState>,
}

impl ConnectionHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The returned [`Notify`] fires when the hub
    /// tears the connection down.
    pub async fn register(&self, sender: mpsc::Sender<ServerMessage>) -> (ConnectionId, Arc<Notify>) {
        let kill = Arc::new(Notify::new());
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        state.connections.insert(id, ConnectionHandle {
            sender,
            game_id: None,
            username: None,
            kill: kill.clone(),
        });
        (id, kill)
    }

    /// Remove a connection and its game association.
    pub async fn unregister(&self, conn_id: ConnectionId) -> bool {
        self.state.write().await.drop_connection(conn_id)
    }

    /// Associate a connection with a game and display name, leaving any
    /// previous game. `game` is the snapshot the caller is about to act on.
    pub async fn associate(&self, conn_id: ConnectionId, game: &Game, username: &str) -> bool {
        let mut state = self.state.write().await;

        let previous = match state.connections.get_mut(&conn_id) {
            Some(handle) => {
                handle.username = Some(username.to_string());
                handle.game_id.replace(game.id.clone())
            }
            None => return false,
        };

        if let Some(previous) = previous.filter(|p| *p != game.id) {
            state.detach(conn_id, &previous);
        }

        state.advance(game);
        let members = state.games.entry(game.id.clone()).or_default();
        if !members.contains(&conn_id) {
            members.push(conn_id);
        }
        true
    }

    /// Game id and display name a connection is associated with.
    pub async fn association(&self, conn_id: ConnectionId) -> Option<(GameId, String)> {
        let state = self.state.read().await;
        let handle = state.connections.get(&conn_id)?;
        Some((handle.game_id.clone()?, handle.username.clone()?))
    }

    /// Deliver to one connection. Returns false if it was torn down.
    pub async fn send_to(&self, conn_id: ConnectionId, message: ServerMessage) -> bool {
        let delivered = {
            let state = self.state.read().await;
            match state.connections.get(&conn_id) {
                Some(handle) => handle.sender.try_send(message).is_ok(),
                None => return false,
            }
        };

        if !delivered {
            warn!(conn_id, "outbound queue saturated, dropping connection");
            self.state.write().await.drop_connection(conn_id);
        }
        delivered
    }

    /// Deliver to every connection following `game_id`. Returns the number
    /// of connections reached; a stale game snapshot reaches none.
    pub async fn broadcast_to_game(&self, game_id: &str, message: &ServerMessage) -> usize {
        let mut state = self.state.write().await;

        if let Some(game) = message.game() {
            if !state.advance(game) {
                debug!(game_id, kind = message.kind(), "dropping stale game state");
                return 0;
            }
        }

        let mut dead = Vec::new();
        let mut reached = 0;
        for conn_id in state.games.get(game_id).into_iter().flatten() {
            let Some(handle) = state.connections.get(conn_id) else {
                continue;
            };
            match handle.sender.try_send(message.clone()) {
                Ok(()) => reached += 1,
                Err(_) => dead.push(*conn_id),
            }
        }

        for conn_id in dead {
            warn!(conn_id, game_id, "outbound queue saturated, dropping connection");
            state.drop_connection(conn_id);
        }

        reached
    }

    /// Forget a game's associations after eviction.
    pub async fn forget_game(&self, game_id: &str) {
        let mut state = self.state.write().await;
        state.latest.remove(game_id);
        let HubState { connections, games, .. } = &mut *state;
        if let Some(members) = games.remove(game_id) {
            for conn_id in members {
                if let Some(handle) = connections.get_mut(&conn_id) {
                    handle.game_id = None;
                }
            }
            debug!(game_id, "forgot evicted game");
        }
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Number of connections following a game.
    pub async fn game_connection_count(&self, game_id: &str) -> usize {
        self.state.read().await.games.get(game_id).map_or(0, Vec::len)
    }
}
