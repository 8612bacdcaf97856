//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON envelope `{"type": ..., "data": ...}`.
//!
//! Inbound messages are parsed in two steps: the envelope first, then the
//! payload fields, so each malformed field gets its own client-facing error.

use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;

use crate::game::board::COLS;
use crate::game::state::{Game, GameStatus, Move, Player};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Join matchmaking, or a specific game when `game_id` is set.
    JoinGame {
        /// Display name, trimmed.
        username: String,
        /// Target game.
        game_id: Option<String>,
    },

    /// Drop a piece in the connection's current game.
    MakeMove {
        /// Column index in `0..COLS`.
        column: usize,
    },

    /// Re-attach to an existing game.
    Reconnect {
        /// Game to follow.
        game_id: String,
        /// Display name in one of its slots.
        username: String,
    },
}

/// Inbound validation failures. The display text is sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not a JSON envelope.
    #[error("Invalid message format")]
    InvalidFormat,
    /// `data` is not an object.
    #[error("Invalid data format")]
    InvalidData,
    /// `type` is not recognised.
    #[error("Unknown message type")]
    UnknownType,
    /// `username` missing or null.
    #[error("Username is required")]
    UsernameRequired,
    /// `username` not a non-blank string.
    #[error("Valid username is required")]
    InvalidUsername,
    /// `column` missing.
    #[error("Column is required")]
    ColumnRequired,
    /// `column` not a whole number.
    #[error("Invalid column format")]
    InvalidColumn,
    /// `column` outside the board.
    #[error("Column must be between 0 and 6")]
    ColumnOutOfRange,
    /// `gameId` missing or null.
    #[error("Game ID is required")]
    GameIdRequired,
    /// `gameId` not a non-blank string.
    #[error("Valid game ID is required")]
    InvalidGameId,
}

#[derive(Deserialize)]
struct Envelope {
    // A missing type reads as empty and is rejected as unknown
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: Value,
}

type Fields = serde_json::Map<String, Value>;

fn present<'a>(fields: &'a Fields, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_null())
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_username(fields: &Fields) -> Result<String, ProtocolError> {
    let value = present(fields, "username").ok_or(ProtocolError::UsernameRequired)?;
    non_blank(value).ok_or(ProtocolError::InvalidUsername)
}

fn parse_column(fields: &Fields) -> Result<usize, ProtocolError> {
    let value = fields.get("column").ok_or(ProtocolError::ColumnRequired)?;

    let column = if let Some(i) = value.as_i64() {
        i
    } else {
        match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
            _ => return Err(ProtocolError::InvalidColumn),
        }
    };

    if column < 0 || column >= COLS as i64 {
        return Err(ProtocolError::ColumnOutOfRange);
    }
    Ok(column as usize)
}

impl ClientMessage {
    /// Parse and validate an inbound JSON envelope.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(s).map_err(|_| ProtocolError::InvalidFormat)?;

        let known = matches!(envelope.kind.as_str(), "join_game" | "make_move" | "reconnect");
        if !known {
            return Err(ProtocolError::UnknownType);
        }
        let Value::Object(fields) = envelope.data else {
            return Err(ProtocolError::InvalidData);
        };

        match envelope.kind.as_str() {
            "join_game" => {
                let username = parse_username(&fields)?;
                // A blank or non-string gameId falls back to matchmaking
                let game_id = present(&fields, "gameId").and_then(non_blank);
                Ok(ClientMessage::JoinGame { username, game_id })
            }
            "make_move" => Ok(ClientMessage::MakeMove {
                column: parse_column(&fields)?,
            }),
            _ => {
                let game_id = present(&fields, "gameId").ok_or(ProtocolError::GameIdRequired)?;
                present(&fields, "username").ok_or(ProtocolError::UsernameRequired)?;
                let game_id = non_blank(game_id).ok_or(ProtocolError::InvalidGameId)?;
                let username = parse_username(&fields)?;
                Ok(ClientMessage::Reconnect { game_id, username })
            }
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to a join request.
    GameJoined(GameJoinedInfo),

    /// A game entered `playing`.
    GameStarted(Game),

    /// A game changed outside of a move.
    GameUpdated(Game),

    /// A move was applied.
    MoveMade(MoveMadeInfo),

    /// Reply to a reconnect request.
    GameReconnected(Game),

    /// Request failed.
    Error(ServerError),
}

/// Join reply payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameJoinedInfo {
    /// Game snapshot.
    pub game: Game,
    /// The joining player.
    pub player: Player,
    /// Still waiting for an opponent.
    pub is_waiting: bool,
}

/// Move payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveMadeInfo {
    /// The applied move.
    #[serde(rename = "move")]
    pub mv: Move,
    /// Game snapshot after the move.
    pub game: Game,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Human-readable message.
    pub message: String,
}

impl ServerMessage {
    /// Error message with the given text.
    pub fn error(message: impl ToString) -> Self {
        ServerMessage::Error(ServerError {
            message: message.to_string(),
        })
    }

    /// Full game state: `game_started` while playing, else `game_updated`.
    pub fn game_state(game: Game) -> Self {
        if game.status == GameStatus::Playing {
            ServerMessage::GameStarted(game)
        } else {
            ServerMessage::GameUpdated(game)
        }
    }

    /// Game snapshot carried by the message, if any.
    pub fn game(&self) -> Option<&Game> {
        match self {
            ServerMessage::GameJoined(info) => Some(&info.game),
            ServerMessage::MoveMade(info) => Some(&info.game),
            ServerMessage::GameStarted(game)
            | ServerMessage::GameUpdated(game)
            | ServerMessage::GameReconnected(game) => Some(game),
            ServerMessage::Error(_) => None,
        }
    }

    /// Wire name of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::GameJoined(_) => "game_joined",
            ServerMessage::GameStarted(_) => "game_started",
            ServerMessage::GameUpdated(_) => "game_updated",
            ServerMessage::MoveMade(_) => "move_made",
            ServerMessage::GameReconnected(_) => "game_reconnected",
            ServerMessage::Error(_) => "error",
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
