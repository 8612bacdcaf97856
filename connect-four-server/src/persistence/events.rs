//! Event-stream sinks.
//!
//! Fire-and-forget. A sink never reports failure back to gameplay.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, trace};

/// Event-stream collaborator.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    fn publish(&self, event_type: &str, payload: serde_json::Value);
}

/// Envelope published on the stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublishedEvent {
    /// Event name, e.g. `game_started`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: serde_json::Value,
    /// Unix seconds.
    pub timestamp: i64,
}

impl PublishedEvent {
    /// Stamp an event with the current time.
    pub fn now(event_type: &str, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            data,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Writes events as structured log records.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event_type: &str, payload: serde_json::Value) {
        info!(target: "game_events", event = event_type, data = %payload, "game event");
    }
}

/// Fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<PublishedEvent>,
}

impl BroadcastEventSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event_type: &str, payload: serde_json::Value) {
        // No subscribers is not an error
        if self.tx.send(PublishedEvent::now(event_type, payload)).is_err() {
            trace!(event = event_type, "no event subscribers");
        }
    }
}
