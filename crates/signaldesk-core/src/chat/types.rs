//! Support chat data types.
//!
//! # Data Model Overview
//!
//! Conversations are stored as one JSON array under a shared key, so the
//! field names follow the camelCase layout the agent-facing surface reads:
//!
//! ```text
//! [
//!   {
//!     "chatId": "chat_1718000000000_u-42",
//!     "userName": "Alex",
//!     "status": "active",
//!     "priority": "medium",
//!     "messages": [{ "id": "user_...", "text": "...", "sender": "user", ... }],
//!     "lastMessage": "...",
//!     "lastUpdate": "2026-02-04T10:15:30.123Z",
//!     "isAgentConnected": false
//!   }
//! ]
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id of the synthesized greeting that opens every session.
pub const WELCOME_MESSAGE_ID: &str = "welcome";

const GUEST_MARKER: &str = "guest";
const DEFAULT_USER_NAME: &str = "User";
const DEFAULT_USER_EMAIL: &str = "user@example.com";

/// Process-wide tiebreaker so ids created within the same millisecond differ.
static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// Message Types
// ============================================================================

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    Agent,
}

impl Sender {
    fn id_prefix(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
            Sender::Agent => "agent",
        }
    }

    /// Label used in transcripts and terminal output.
    pub fn label(self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Bot => "AI Assistant",
            Sender::Agent => "Support Agent",
        }
    }
}

/// A single chat message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub id: String,

    /// Message body.
    pub text: String,

    /// Author role.
    pub sender: Sender,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,

    /// True for transient typing placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_typing: Option<bool>,
}

impl Message {
    /// Create a message stamped with the current time and a fresh id.
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!(
                "{}_{}_{}",
                sender.id_prefix(),
                timestamp.timestamp_millis(),
                seq
            ),
            text: text.into(),
            sender,
            timestamp,
            is_typing: None,
        }
    }

    /// Create the session greeting addressed to `display_name`.
    pub fn welcome(display_name: Option<&str>) -> Self {
        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("there");
        Self {
            id: WELCOME_MESSAGE_ID.to_string(),
            text: format!(
                "Hello {name}! I'm your AI assistant. How can I help you today? \
                 Type \"human\" or \"agent\" if you'd like to speak with a human representative."
            ),
            sender: Sender::Bot,
            timestamp: Utc::now(),
            is_typing: None,
        }
    }
}

// ============================================================================
// Conversation Types
// ============================================================================

/// Conversation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Closed,
}

/// Informational priority shown in the agent console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// One stored conversation, shared between the user widget and the agent console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Stable conversation identifier.
    pub chat_id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    pub user_name: String,

    pub user_email: String,

    #[serde(default)]
    pub status: ConversationStatus,

    #[serde(default)]
    pub priority: Priority,

    /// Append-only, in display order.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Denormalized text of the latest user or agent message for list views.
    #[serde(default)]
    pub last_message: String,

    pub last_update: DateTime<Utc>,

    /// Sticky once true.
    #[serde(rename = "isAgentConnected", default)]
    pub agent_connected: bool,
}

impl Conversation {
    /// Create a record seeded with its first message.
    pub fn new(chat_id: impl Into<String>, identity: &Identity, first: Message) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: identity.user_id.clone(),
            user_name: identity
                .display_name
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
            user_email: identity
                .email
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_EMAIL.to_string()),
            status: ConversationStatus::Active,
            priority: Priority::Medium,
            last_message: first.text.clone(),
            last_update: Utc::now(),
            messages: vec![first],
            agent_connected: false,
        }
    }

    /// Append a message without touching the list-view fields.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a message and refresh `last_message` / `last_update`.
    pub fn push_and_touch(&mut self, message: Message) {
        self.last_message = message.text.clone();
        self.last_update = Utc::now();
        self.messages.push(message);
    }

    /// Flip the agent flag on. There is no way to turn it back off.
    pub fn mark_agent_connected(&mut self) {
        self.agent_connected = true;
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Caller identity supplied by the host application. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn named(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            display_name: Some(display_name.into()),
            email: None,
        }
    }

    /// Build a fresh conversation id: `chat_<unix-millis>_<user id or guest>`.
    pub fn new_conversation_id(&self, now: DateTime<Utc>) -> String {
        let owner = self
            .user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(GUEST_MARKER);
        format!("chat_{}_{}", now.timestamp_millis(), owner)
    }
}

/// Everything the presentation layer needs to render the widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub chat_id: Option<String>,
    pub messages: Vec<Message>,
    pub is_typing: bool,
    pub is_agent_connected: bool,
    pub is_open: bool,
    pub is_minimized: bool,
}
