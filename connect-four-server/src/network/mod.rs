//! Network Layer
//!
//! WebSocket transport, wire protocol, connection fan-out and the session
//! registry. Game rules live in `game/`; this layer only routes requests
//! into them.

pub mod protocol;
pub mod session;
pub mod hub;
pub mod server;

pub use protocol::{ClientMessage, GameJoinedInfo, MoveMadeInfo, ProtocolError, ServerError, ServerMessage};
pub use session::{GameNotice, JoinOutcome, SessionConfig, SessionError, SessionManager};
pub use hub::{ConnectionHub, ConnectionId};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig};
