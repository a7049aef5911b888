//! Agent-facing view of the shared conversation store.
//!
//! Customer-service agents list conversations, answer them and triage them.
//! Answers are appended to the same record the user's session polls, which
//! is how they reach the user.

use std::sync::Arc;

use thiserror::Error;

use crate::chat::{Conversation, ConversationStatus, Message, Priority, Sender};
use crate::event_bus::{conversation_event_type, EventBus};
use crate::persistence::{ConversationStore, StoreError};

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Message text cannot be empty")]
    EmptyMessage,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub struct AgentConsole {
    store: Arc<dyn ConversationStore>,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentConsole {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            event_bus: None,
        }
    }

    /// Publish `support:conversation:<id>` after every change.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// All conversations, most recently updated first.
    pub fn list(&self) -> Vec<Conversation> {
        let mut conversations = self.store.list_all();
        conversations.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        conversations
    }

    /// Active conversations only, most recently updated first.
    pub fn list_active(&self) -> Vec<Conversation> {
        self.list()
            .into_iter()
            .filter(|c| c.status == ConversationStatus::Active)
            .collect()
    }

    pub fn conversation(&self, chat_id: &str) -> Result<Conversation, ConsoleError> {
        self.store
            .get(chat_id)
            .ok_or_else(|| ConsoleError::NotFound(chat_id.to_string()))
    }

    /// Answer a conversation as an agent.
    ///
    /// Marks the conversation agent-connected so the user's session keeps
    /// routing replies to a human.
    pub fn reply(&self, chat_id: &str, text: &str) -> Result<Message, ConsoleError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConsoleError::EmptyMessage);
        }

        let message = Message::new(Sender::Agent, text);
        let stored = message.clone();
        self.modify(chat_id, move |conv| {
            conv.mark_agent_connected();
            conv.push_and_touch(stored);
        })?;

        log::info!("Agent replied to {}", chat_id);
        Ok(message)
    }

    pub fn set_status(
        &self,
        chat_id: &str,
        status: ConversationStatus,
    ) -> Result<Conversation, ConsoleError> {
        self.modify(chat_id, move |conv| conv.status = status)
    }

    pub fn set_priority(
        &self,
        chat_id: &str,
        priority: Priority,
    ) -> Result<Conversation, ConsoleError> {
        self.modify(chat_id, move |conv| conv.priority = priority)
    }

    fn modify<F>(&self, chat_id: &str, change: F) -> Result<Conversation, ConsoleError>
    where
        F: FnOnce(&mut Conversation),
    {
        let mut updated = None;
        let written = self.store.upsert(
            chat_id,
            Box::new(|existing| {
                let mut conv = existing?;
                change(&mut conv);
                updated = Some(conv.clone());
                Some(conv)
            }),
        )?;

        let conversation = match updated {
            Some(conv) if written => conv,
            _ => return Err(ConsoleError::NotFound(chat_id.to_string())),
        };

        if let Some(bus) = &self.event_bus {
            bus.emit(&conversation_event_type(chat_id), &conversation);
        }
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Identity;
    use crate::persistence::{MemoryBlobStore, SharedConversationStore};

    fn console_with(chat_ids: &[&str]) -> (Arc<SharedConversationStore>, AgentConsole) {
        let store = Arc::new(SharedConversationStore::new(Arc::new(MemoryBlobStore::new())));
        for id in chat_ids {
            let owned = id.to_string();
            store
                .upsert(
                    id,
                    Box::new(move |_| {
                        Some(Conversation::new(
                            owned,
                            &Identity::guest(),
                            Message::new(Sender::User, "help"),
                        ))
                    }),
                )
                .unwrap();
        }
        let console = AgentConsole::new(store.clone());
        (store, console)
    }

    #[test]
    fn reply_appends_agent_message_and_connects() {
        let (store, console) = console_with(&["c1"]);

        let message = console.reply("c1", "  Hi, Sam here.  ").unwrap();
        assert_eq!(message.text, "Hi, Sam here.");
        assert_eq!(message.sender, Sender::Agent);

        let conv = store.get("c1").unwrap();
        assert!(conv.agent_connected);
        assert_eq!(conv.last().unwrap().id, message.id);
        assert_eq!(conv.last_message, "Hi, Sam here.");
    }

    #[test]
    fn reply_to_unknown_conversation_is_not_found() {
        let (store, console) = console_with(&[]);
        assert!(matches!(
            console.reply("missing", "hello"),
            Err(ConsoleError::NotFound(_))
        ));
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn empty_reply_is_rejected() {
        let (_, console) = console_with(&["c1"]);
        assert!(matches!(
            console.reply("c1", "   "),
            Err(ConsoleError::EmptyMessage)
        ));
    }

    #[test]
    fn list_orders_by_last_update() {
        let (_, console) = console_with(&["older", "newer"]);
        console.reply("older", "bumped").unwrap();

        let ids: Vec<_> = console.list().into_iter().map(|c| c.chat_id).collect();
        assert_eq!(ids, vec!["older", "newer"]);
    }

    #[test]
    fn closed_conversations_drop_out_of_active_list() {
        let (_, console) = console_with(&["c1", "c2"]);
        let closed = console.set_status("c1", ConversationStatus::Closed).unwrap();
        assert_eq!(closed.status, ConversationStatus::Closed);

        let active: Vec<_> = console
            .list_active()
            .into_iter()
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(active, vec!["c2"]);
    }

    #[test]
    fn set_priority_updates_record() {
        let (store, console) = console_with(&["c1"]);
        console.set_priority("c1", Priority::High).unwrap();
        assert_eq!(store.get("c1").unwrap().priority, Priority::High);
    }

    #[tokio::test]
    async fn changes_are_published() {
        let (_, console) = console_with(&["c1"]);
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let console = console.with_event_bus(bus);

        console.reply("c1", "hello").unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "support:conversation:c1");
        let conv: Conversation = event.decode().unwrap();
        assert!(conv.agent_connected);
    }
}
