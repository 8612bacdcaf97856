//! Game State Definitions
//!
//! Game, player slots, and the per-game turn state machine:
//! `waiting -> playing -> finished`.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::board::{Board, BoardError};

/// Opaque game identifier (UUID string).
pub type GameId = String;

/// Display name used for the scripted opponent.
pub const SCRIPTED_NAME: &str = "Smart Bot";

// =============================================================================
// MARK
// =============================================================================

/// Piece owner. Slot A always holds the game's creator.
///
/// Serialized as `1` (slot A) or `2` (slot B).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mark {
    /// Slot A, moves first.
    A,
    /// Slot B.
    B,
}

impl Mark {
    /// The other slot.
    #[inline]
    pub fn opponent(self) -> Mark {
        match self {
            Mark::A => Mark::B,
            Mark::B => Mark::A,
        }
    }
}

impl From<Mark> for u8 {
    fn from(mark: Mark) -> u8 {
        match mark {
            Mark::A => 1,
            Mark::B => 2,
        }
    }
}

impl TryFrom<u8> for Mark {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Mark::A),
            2 => Ok(Mark::B),
            other => Err(format!("invalid mark {other}")),
        }
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// A player in a game slot. The display name is the identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Display name (deduplication key).
    pub username: String,
    /// Scripted opponent flag.
    pub is_bot: bool,
}

impl Player {
    /// Create a human player.
    pub fn human(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_bot: false,
        }
    }

    /// Create the scripted opponent.
    pub fn scripted() -> Self {
        Self {
            username: SCRIPTED_NAME.to_string(),
            is_bot: true,
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Slot B is empty.
    Waiting,
    /// Both slots filled, moves accepted.
    Playing,
    /// Terminal.
    Finished,
}

/// Game result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// Not decided yet.
    None,
    /// Slot A won.
    Player1,
    /// Slot B won.
    Player2,
    /// Board filled with no four in a row.
    Draw,
}

impl From<Mark> for Winner {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::A => Winner::Player1,
            Mark::B => Winner::Player2,
        }
    }
}

/// A successfully applied move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    /// Game the move belongs to.
    pub game_id: GameId,
    /// Acting slot.
    pub player: Mark,
    /// Column the piece was dropped into.
    pub column: usize,
    /// Row the piece landed on.
    pub row: usize,
}

/// Move rejections from a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Game is not in `playing` status.
    #[error("game is not active")]
    NotActive,
    /// The acting slot does not hold the turn.
    #[error("not your turn")]
    NotYourTurn,
    /// Column index out of range.
    #[error("invalid column")]
    InvalidColumn,
    /// Column has no empty cell.
    #[error("column is full")]
    ColumnFull,
}

impl From<BoardError> for MoveError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::InvalidColumn => MoveError::InvalidColumn,
            BoardError::ColumnFull => MoveError::ColumnFull,
        }
    }
}

// =============================================================================
// GAME
// =============================================================================

/// A single Connect Four game.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Unique game identifier.
    pub id: GameId,
    /// Playing grid.
    pub board: Board,
    /// Slot holding the turn.
    pub current_turn: Mark,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Result, `None` until finished.
    pub winner: Winner,
    /// Slot A (creator).
    pub player1: Player,
    /// Slot B, filled on pairing.
    pub player2: Option<Player>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last accepted move (creation time before the first).
    pub last_move: DateTime<Utc>,
    /// Slot B is the scripted opponent.
    pub is_bot: bool,
}

impl Game {
    /// Create a waiting game with `player1` in slot A.
    pub fn new(player1: Player) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            board: Board::new(),
            current_turn: Mark::A,
            status: GameStatus::Waiting,
            winner: Winner::None,
            player1,
            player2: None,
            created_at: now,
            last_move: now,
            is_bot: false,
        }
    }

    /// Fill slot B and start play.
    pub fn add_player2(&mut self, player: Player) {
        self.is_bot = player.is_bot;
        self.player2 = Some(player);
        self.status = GameStatus::Playing;
    }

    /// Player in the given slot.
    pub fn player(&self, mark: Mark) -> Option<&Player> {
        match mark {
            Mark::A => Some(&self.player1),
            Mark::B => self.player2.as_ref(),
        }
    }

    /// Slot held by the human with this display name.
    pub fn human_slot(&self, username: &str) -> Option<Mark> {
        [Mark::A, Mark::B].into_iter().find(|&mark| {
            self.player(mark)
                .is_some_and(|p| !p.is_bot && p.username == username)
        })
    }

    /// True if `username` occupies either slot.
    pub fn has_player(&self, username: &str) -> bool {
        self.player1.username == username
            || self.player2.as_ref().is_some_and(|p| p.username == username)
    }

    /// True when the scripted side should move next.
    pub fn is_scripted_turn(&self) -> bool {
        self.is_bot && self.status == GameStatus::Playing && self.current_turn == Mark::B
    }

    /// Apply a move for `mark`, then finalize or pass the turn.
    pub fn make_move(&mut self, column: usize, mark: Mark) -> Result<Move, MoveError> {
        if self.status != GameStatus::Playing {
            return Err(MoveError::NotActive);
        }

        if self.current_turn != mark {
            return Err(MoveError::NotYourTurn);
        }

        let row = self.board.apply_move(column, mark)?;
        self.last_move = Utc::now();

        if self.board.check_win(row, column, mark) {
            self.status = GameStatus::Finished;
            self.winner = mark.into();
        } else if self.board.is_full() {
            self.status = GameStatus::Finished;
            self.winner = Winner::Draw;
        } else {
            self.current_turn = mark.opponent();
        }

        Ok(Move {
            game_id: self.id.clone(),
            player: mark,
            column,
            row,
        })
    }

    /// Winner's display name, `"draw"` for a draw, `None` while undecided.
    pub fn winner_name(&self) -> Option<String> {
        match self.winner {
            Winner::None => None,
            Winner::Draw => Some("draw".to_string()),
            Winner::Player1 => Some(self.player1.username.clone()),
            Winner::Player2 => self.player2.as_ref().map(|p| p.username.clone()),
        }
    }

    /// Ordering key that only grows over a game's life: lifecycle stage,
    /// then pieces on the board.
    pub fn progress(&self) -> (u8, usize) {
        let stage = match self.status {
            GameStatus::Waiting => 0,
            GameStatus::Playing => 1,
            GameStatus::Finished => 2,
        };
        (stage, self.board.piece_count())
    }

    /// Seconds since creation.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).to_std().unwrap_or_default().as_secs_f64()
    }
}
