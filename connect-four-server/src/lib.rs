//! # Connect Four Server
//!
//! Real-time Connect Four over WebSocket: matchmaking, a scripted opponent
//! for players left waiting, and a leaderboard of winning times.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CONNECT FOUR SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  └── rng.rs      - Seedable Xorshift128+ PRNG                │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── board.rs    - 6x7 grid, gravity, win/draw detection     │
//! │  ├── state.rs    - Game, players, turn state machine         │
//! │  ├── bot.rs      - Heuristic opponent                        │
//! │  ├── leaderboard.rs - Player aggregates, game records        │
//! │  └── events.rs   - Lifecycle events                          │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Game registry and matchmaking             │
//! │  └── hub.rs      - Connection fan-out                        │
//! │                                                              │
//! │  persistence/    - Optional collaborators                    │
//! │  ├── store.rs    - Finished-game storage                     │
//! │  └── events.rs   - Event stream sinks                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! The session registry and the connection hub each own one lock and never
//! hold it while calling the other. Registry-driven changes reach the hub
//! as [`network::GameNotice`] values sent after the registry lock is
//! released.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod persistence;

// Re-export commonly used types
pub use core::rng::{DeterministicRng, RandomSource};
pub use game::board::{Board, COLS, ROWS};
pub use game::bot::select_move;
pub use game::state::{Game, GameStatus, Mark, Move, Player, Winner};
pub use network::{GameServer, ServerConfig, SessionConfig, SessionManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
