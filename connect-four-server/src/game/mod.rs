//! Game Logic Module
//!
//! Rules, data model, and the scripted opponent. Nothing here touches the
//! network or the clock except for timestamps on [`Game`].
//!
//! ## Module Structure
//!
//! - `board`: Grid, gravity fill, win/draw detection
//! - `state`: Game, players, moves, turn state machine
//! - `bot`: Heuristic opponent
//! - `leaderboard`: Per-player aggregates and finished-game records
//! - `events`: Lifecycle events for the event stream

pub mod board;
pub mod state;
pub mod bot;
pub mod leaderboard;
pub mod events;

// Re-export key types
pub use board::{Board, BoardError, ROWS, COLS};
pub use state::{Game, GameId, GameStatus, Mark, Move, MoveError, Player, Winner, SCRIPTED_NAME};
pub use leaderboard::{GameRecord, GameStats, Leaderboard, PlayerStats};
pub use events::GameEvent;
