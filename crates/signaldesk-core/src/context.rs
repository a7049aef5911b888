//! DeskContext - shared state for every SignalDesk front end.
//!
//! The HTTP server, the terminal chat client and the signal runner all work
//! against the same blob store, conversation store and event bus. Cloning
//! the context clones the `Arc`s.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │       DeskContext       │
//!                    ├─────────────────────────┤
//!                    │  - EventBus             │
//!                    │  - BlobStore            │
//!                    │  - ConversationStore    │
//!                    │  - AgentConsole         │
//!                    │  - PinGate              │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!     │ HTTP Server │     │ SupportChat │     │  SignalBot  │
//!     └─────────────┘     └─────────────┘     └─────────────┘
//! ```

use std::sync::Arc;

use crate::access::PinGate;
use crate::chat::Identity;
use crate::config::DeskConfig;
use crate::event_bus::EventBus;
use crate::managers::{AgentConsole, SupportChat};
use crate::persistence::{BlobStore, ConversationStore, MemoryBlobStore, SharedConversationStore};
use crate::signals::SignalBot;

#[derive(Default)]
pub struct DeskContextBuilder {
    config: Option<DeskConfig>,
    event_bus: Option<Arc<EventBus>>,
    blobs: Option<Arc<dyn BlobStore>>,
    conversations: Option<Arc<dyn ConversationStore>>,
}

impl DeskContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DeskConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an existing EventBus (for testing or custom configurations).
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Backing key/value store. Defaults to an in-memory store.
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Override the conversation store. Defaults to the shared store over `blobs`.
    pub fn conversations(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    pub fn build(self) -> DeskContext {
        let mut config = self.config.unwrap_or_default();
        config.normalize();

        let event_bus = self.event_bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let blobs = self
            .blobs
            .unwrap_or_else(|| Arc::new(MemoryBlobStore::new()));
        let conversations = self
            .conversations
            .unwrap_or_else(|| Arc::new(SharedConversationStore::new(blobs.clone())));

        let console = Arc::new(
            AgentConsole::new(conversations.clone()).with_event_bus(event_bus.clone()),
        );
        let pin_gate = Arc::new(PinGate::new(blobs.clone(), config.access.clone()));

        DeskContext {
            config: Arc::new(config),
            event_bus,
            blobs,
            conversations,
            console,
            pin_gate,
        }
    }
}

#[derive(Clone)]
pub struct DeskContext {
    pub config: Arc<DeskConfig>,
    pub event_bus: Arc<EventBus>,
    pub blobs: Arc<dyn BlobStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub console: Arc<AgentConsole>,
    pub pin_gate: Arc<PinGate>,
}

impl DeskContext {
    pub fn builder() -> DeskContextBuilder {
        DeskContextBuilder::new()
    }

    /// A user-facing chat session wired to this context's store and bus.
    pub fn open_chat(&self, identity: Identity) -> SupportChat {
        SupportChat::builder(identity, self.conversations.clone())
            .config(self.config.chat.clone())
            .event_bus(self.event_bus.clone())
            .build()
    }

    /// A signal bot using the configured settings, publishing on this bus.
    pub fn signal_bot(&self) -> SignalBot {
        SignalBot::new(self.config.signals.clone()).with_event_bus(self.event_bus.clone())
    }
}

impl Default for DeskContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Message, Sender};

    #[test]
    fn builder_uses_provided_event_bus() {
        let bus = Arc::new(EventBus::new());
        let ctx = DeskContext::builder().event_bus(bus.clone()).build();
        assert!(Arc::ptr_eq(&ctx.event_bus, &bus));
    }

    #[test]
    fn config_is_normalized() {
        let mut config = DeskConfig::default();
        config.signals.interval_secs = 1;
        let ctx = DeskContext::builder().config(config).build();
        assert_eq!(ctx.config.signals.interval_secs, 30);
    }

    #[test]
    fn console_sees_conversations_written_through_blobs() {
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let ctx = DeskContext::builder().blobs(blobs.clone()).build();

        let other_tab = SharedConversationStore::new(blobs);
        other_tab
            .upsert(
                "c1",
                Box::new(|_| {
                    Some(crate::chat::Conversation::new(
                        "c1",
                        &Identity::guest(),
                        Message::new(Sender::User, "hi"),
                    ))
                }),
            )
            .unwrap();

        assert_eq!(ctx.console.list().len(), 1);
    }

    #[test]
    fn context_is_cheaply_clonable() {
        let ctx = DeskContext::default();
        let ctx2 = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.event_bus, &ctx2.event_bus));
        assert!(Arc::ptr_eq(&ctx.console, &ctx2.console));
    }

    #[tokio::test]
    async fn open_chat_shares_the_store() {
        let ctx = DeskContext::default();
        let chat = ctx.open_chat(Identity::named("u1", "Alex"));
        chat.open();
        chat.submit("hello");

        let chat_id = chat.chat_id().unwrap();
        assert!(ctx.console.conversation(&chat_id).is_ok());
    }
}
