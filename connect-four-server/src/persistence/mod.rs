//! Collaborators outside the game core.
//!
//! - `store`: finished-game persistence
//! - `events`: event-stream publishing

pub mod store;
pub mod events;

pub use store::{GameStore, JsonlGameStore, MemoryGameStore, StoreError};
pub use events::{BroadcastEventSink, EventSink, LogEventSink, PublishedEvent};
