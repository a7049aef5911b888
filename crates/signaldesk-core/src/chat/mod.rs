//! Support chat domain: messages, conversations and the reply rule table.

pub mod classifier;
pub mod types;

pub use classifier::{Reply, ReplyClassifier, ReplyRule, HANDOFF_REPLY};
pub use types::{
    ChatSnapshot, Conversation, ConversationStatus, Identity, Message, Priority, Sender,
    WELCOME_MESSAGE_ID,
};
