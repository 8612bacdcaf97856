//! Game Events
//!
//! Lifecycle events handed to the event stream. Serialized as
//! `{"type": ..., "data": {...}}` with camelCase payload fields.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::{Game, GameId, Move};

/// Gameplay event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GameEvent {
    /// Both slots filled.
    #[serde(rename_all = "camelCase")]
    GameStarted {
        /// Game identifier.
        game_id: GameId,
        /// Slot A display name.
        player1: String,
        /// Slot B display name.
        player2: String,
        /// Slot B is scripted.
        is_bot: bool,
    },

    /// A move was applied.
    #[serde(rename_all = "camelCase")]
    MoveMade {
        /// Game identifier.
        game_id: GameId,
        /// Acting player's display name.
        player: String,
        /// Column played.
        column: usize,
        /// Landing row.
        row: usize,
        /// Move came from the scripted opponent.
        is_bot: bool,
    },

    /// The game reached a win or a draw.
    #[serde(rename_all = "camelCase")]
    GameFinished {
        /// Game identifier.
        game_id: GameId,
        /// Winner display name or `"draw"`.
        winner: String,
        /// Seconds since creation.
        duration: f64,
    },
}

impl GameEvent {
    /// Event for a game that just filled slot B.
    pub fn started(game: &Game) -> Self {
        Self::GameStarted {
            game_id: game.id.clone(),
            player1: game.player1.username.clone(),
            player2: game
                .player2
                .as_ref()
                .map(|p| p.username.clone())
                .unwrap_or_default(),
            is_bot: game.is_bot,
        }
    }

    /// Event for an applied move.
    pub fn move_made(game: &Game, mv: &Move) -> Self {
        let actor = game.player(mv.player);
        Self::MoveMade {
            game_id: mv.game_id.clone(),
            player: actor.map(|p| p.username.clone()).unwrap_or_default(),
            column: mv.column,
            row: mv.row,
            is_bot: actor.is_some_and(|p| p.is_bot),
        }
    }

    /// Event for a finished game, `None` while it is still undecided.
    pub fn finished(game: &Game, now: DateTime<Utc>) -> Option<Self> {
        Some(Self::GameFinished {
            game_id: game.id.clone(),
            winner: game.winner_name()?,
            duration: game.elapsed_seconds(now),
        })
    }

    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::GameStarted { .. } => "game_started",
            GameEvent::MoveMade { .. } => "move_made",
            GameEvent::GameFinished { .. } => "game_finished",
        }
    }

    /// Payload object without the type tag.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("data").unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        }
    }
}
