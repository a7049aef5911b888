//! Framework-agnostic event broadcasting.
//!
//! Chat sessions, the agent console and the signal bot publish state changes
//! here; presentation layers (terminal client, WebSocket clients) subscribe.
//!
//! Event types are colon-separated:
//!
//! - `support:chat:<chatId>` - a [`ChatSnapshot`](crate::chat::ChatSnapshot)
//!   for the user-facing widget
//! - `support:conversation:<chatId>` - a stored
//!   [`Conversation`](crate::chat::Conversation) changed via the agent console
//! - `signals:new` - a freshly generated [`Signal`](crate::signals::Signal)
//!
//! # Example
//!
//! ```rust
//! use signaldesk_core::event_bus::{chat_event_type, EventBus};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//! bus.emit(&chat_event_type("chat_1_guest"), &serde_json::json!({"isTyping": true}));
//! // let event = rx.recv().await.unwrap();
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events beyond this many unread cause slow subscribers to lag.
const DEFAULT_CAPACITY: usize = 1024;

pub const SIGNAL_EVENT: &str = "signals:new";

/// Event type carrying a user-facing chat snapshot.
pub fn chat_event_type(chat_id: &str) -> String {
    format!("support:chat:{chat_id}")
}

/// Event type carrying an updated stored conversation.
pub fn conversation_event_type(chat_id: &str) -> String {
    format!("support:conversation:{chat_id}")
}

/// Check if an event type matches a subscription pattern.
///
/// Supports wildcards:
/// - `*` matches any single segment
/// - Pattern ending with `:*` matches any suffix
pub fn matches_pattern(event_type: &str, pattern: &str) -> bool {
    if event_type == pattern {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(":*") {
        if event_type.starts_with(prefix) && event_type[prefix.len()..].starts_with(':') {
            return true;
        }
    }

    if pattern.contains('*') {
        let pattern_parts: Vec<&str> = pattern.split(':').collect();
        let event_parts: Vec<&str> = event_type.split(':').collect();

        return pattern_parts.len() == event_parts.len()
            && pattern_parts
                .iter()
                .zip(event_parts.iter())
                .all(|(p, e)| *p == "*" || p == e);
    }

    false
}

/// A broadcast event containing an event type and JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl BroadcastEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Decode the payload into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Publish-subscribe hub backed by a tokio broadcast channel.
pub struct EventBus {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it. With no
    /// subscribers the event is dropped and 0 is returned.
    pub fn emit<T: Serialize>(&self, event_type: &str, payload: &T) -> usize {
        let json_payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Failed to serialize event payload: {}", e);
                return 0;
            }
        };

        self.sender
            .send(BroadcastEvent::new(event_type, json_payload))
            .unwrap_or(0)
    }

    /// Subscribe to future events. Past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
