//! User-facing support chat session.
//!
//! Drives one user's conversation: accepts input, schedules simulated
//! bot/agent replies, mirrors every message into the shared
//! [`ConversationStore`], and polls that store for agent messages written by
//! the agent console.
//!
//! # Lifecycle
//!
//! ```text
//! open()  ──► welcome + chat id (first time only), start polling
//! submit() ─► user message, store upsert, typing on, queue reply
//!              └─► after 1.5-3.5s: bot reply (or agent intro once handed off)
//! poll tick ─► new agent message in store? append + mark agent connected
//! close() ──► stop polling; queued replies still land in the store
//! ```
//!
//! Must be used inside a tokio runtime: polling and replies are spawned tasks.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::chat::{ChatSnapshot, Conversation, Identity, Message, ReplyClassifier, Sender};
use crate::config::ChatConfig;
use crate::event_bus::{chat_event_type, EventBus};
use crate::logging::{self, TranscriptHandle};
use crate::persistence::ConversationStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A reply waiting to be produced.
struct ReplyJob {
    chat_id: String,
    user_text: String,
    delay: Duration,
}

/// Mutable per-session state guarded by one mutex.
struct ChatState {
    chat_id: Option<String>,
    messages: Vec<Message>,
    pending_replies: usize,
    agent_connected: bool,
    open: bool,
    minimized: bool,
    transcript: TranscriptHandle,
}

impl ChatState {
    fn new() -> Self {
        Self {
            chat_id: None,
            messages: Vec::new(),
            pending_replies: 0,
            agent_connected: false,
            open: false,
            minimized: false,
            transcript: logging::disabled(),
        }
    }

    fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    fn append(&mut self, message: Message) {
        logging::log_message(&self.transcript, &message);
        self.messages.push(message);
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            chat_id: self.chat_id.clone(),
            messages: self.messages.clone(),
            is_typing: self.pending_replies > 0,
            is_agent_connected: self.agent_connected,
            is_open: self.open,
            is_minimized: self.minimized,
        }
    }
}

/// State shared with the poll task and reply tasks.
struct Inner {
    identity: Identity,
    config: ChatConfig,
    store: Arc<dyn ConversationStore>,
    classifier: ReplyClassifier,
    event_bus: Option<Arc<EventBus>>,
    state: Mutex<ChatState>,
}

impl Inner {
    fn publish(&self) {
        let Some(bus) = &self.event_bus else {
            return;
        };
        let snapshot = lock(&self.state).snapshot();
        if let Some(chat_id) = &snapshot.chat_id {
            bus.emit(&chat_event_type(chat_id), &snapshot);
        }
    }

    /// Assign the conversation id and greet, once per session.
    fn ensure_initialized(&self, state: &mut ChatState) -> String {
        if let Some(chat_id) = &state.chat_id {
            return chat_id.clone();
        }

        let chat_id = self.identity.new_conversation_id(Utc::now());
        state.transcript =
            logging::open_transcript(self.config.transcript_dir.as_deref(), &chat_id);
        if state.messages.is_empty() {
            state.append(Message::welcome(self.identity.display_name.as_deref()));
        }
        state.chat_id = Some(chat_id.clone());
        log::info!("Support chat {} started", chat_id);
        chat_id
    }

    fn agent_intro(&self) -> String {
        format!(
            "Hello! I'm {} from customer support. I see you were chatting with our AI assistant. How can I help you today?",
            self.config.agent_name
        )
    }

    fn pick_reply_delay(&self) -> Duration {
        let (min, max) = self.config.reply_delay_bounds();
        let (min, max) = (min.as_millis() as u64, max.as_millis() as u64);
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Upsert a freshly submitted user message into the shared record.
    fn store_user_message(&self, chat_id: &str, message: &Message) {
        let message = message.clone();
        let identity = self.identity.clone();
        let owned_id = chat_id.to_string();
        let result = self.store.upsert(
            chat_id,
            Box::new(move |existing| match existing {
                Some(mut conv) => {
                    conv.push_and_touch(message);
                    Some(conv)
                }
                None => Some(Conversation::new(owned_id, &identity, message)),
            }),
        );
        if let Err(e) = result {
            log::warn!("Failed to store user message for {}: {}", chat_id, e);
        }
    }

    /// Produce the reply for one submission. Runs when the reply timer fires.
    fn produce_reply(&self, chat_id: &str, user_text: &str) {
        let (reply, connect) = {
            let mut state = lock(&self.state);
            state.pending_replies = state.pending_replies.saturating_sub(1);

            let (reply, connect) = if state.agent_connected {
                (Message::new(Sender::Agent, self.agent_intro()), true)
            } else {
                let outcome = self.classifier.classify(user_text);
                if outcome.handoff {
                    log::info!("Support chat {} handed off to an agent", chat_id);
                    state.agent_connected = true;
                }
                (Message::new(Sender::Bot, outcome.text), outcome.handoff)
            };

            state.append(reply.clone());
            (reply, connect)
        };
        self.publish();

        let result = self.store.upsert(
            chat_id,
            Box::new(move |existing| {
                let mut conv = existing?;
                if connect {
                    conv.mark_agent_connected();
                }
                conv.push(reply);
                Some(conv)
            }),
        );
        if let Err(e) = result {
            log::warn!("Failed to store reply for {}: {}", chat_id, e);
        }
    }

    /// Pick up an agent message appended to the shared record by someone else.
    fn poll_external(&self) -> Option<Message> {
        let chat_id = lock(&self.state).chat_id.clone()?;
        let latest = self.store.get(&chat_id)?.last()?.clone();
        if latest.sender != Sender::Agent {
            return None;
        }

        {
            let mut state = lock(&self.state);
            if state.contains(&latest.id) {
                return None;
            }
            state.append(latest.clone());
            state.agent_connected = true;
        }

        log::debug!("Support chat {} received agent message {}", chat_id, latest.id);
        self.publish();
        Some(latest)
    }

    /// Merge store-side messages missing locally (used on reopen).
    fn resync(&self, state: &mut ChatState) -> usize {
        let Some(chat_id) = state.chat_id.clone() else {
            return 0;
        };
        let Some(record) = self.store.get(&chat_id) else {
            return 0;
        };

        let mut merged = 0;
        for message in record.messages {
            if !state.contains(&message.id) {
                state.append(message);
                merged += 1;
            }
        }
        if record.agent_connected {
            state.agent_connected = true;
        }
        merged
    }
}

/// Builder for [`SupportChat`].
pub struct SupportChatBuilder {
    identity: Identity,
    store: Arc<dyn ConversationStore>,
    config: ChatConfig,
    classifier: ReplyClassifier,
    event_bus: Option<Arc<EventBus>>,
}

impl SupportChatBuilder {
    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(mut self, classifier: ReplyClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Publish a [`ChatSnapshot`] on every state change.
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn build(self) -> SupportChat {
        SupportChat {
            inner: Arc::new(Inner {
                identity: self.identity,
                config: self.config,
                store: self.store,
                classifier: self.classifier,
                event_bus: self.event_bus,
                state: Mutex::new(ChatState::new()),
            }),
            poll_task: Mutex::new(None),
            reply_tx: Mutex::new(None),
        }
    }
}

/// One user's support chat session.
pub struct SupportChat {
    inner: Arc<Inner>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    /// Queue feeding the reply worker when replies are serialized.
    reply_tx: Mutex<Option<mpsc::UnboundedSender<ReplyJob>>>,
}

impl SupportChat {
    pub fn builder(identity: Identity, store: Arc<dyn ConversationStore>) -> SupportChatBuilder {
        SupportChatBuilder {
            identity,
            store,
            config: ChatConfig::default(),
            classifier: ReplyClassifier::default(),
            event_bus: None,
        }
    }

    /// Session with default config and rules.
    pub fn new(identity: Identity, store: Arc<dyn ConversationStore>) -> Self {
        Self::builder(identity, store).build()
    }

    /// Open (or reopen) the widget.
    ///
    /// The first open greets the user and assigns the conversation id.
    /// Reopening keeps the in-memory conversation and, when
    /// `resync_on_reopen` is set, merges messages that arrived in the store
    /// while the widget was closed.
    pub fn open(&self) {
        {
            let mut state = lock(&self.inner.state);
            if state.chat_id.is_none() {
                self.inner.ensure_initialized(&mut state);
            } else if !state.open && self.inner.config.resync_on_reopen {
                let merged = self.inner.resync(&mut state);
                if merged > 0 {
                    log::debug!("Merged {} stored messages on reopen", merged);
                }
            }
            state.open = true;
        }
        self.start_polling();
        self.inner.publish();
    }

    /// Close the widget. Stops polling; pending replies still complete.
    pub fn close(&self) {
        if let Some(task) = lock(&self.poll_task).take() {
            task.abort();
        }
        lock(&self.inner.state).open = false;
        self.inner.publish();
    }

    pub fn set_minimized(&self, minimized: bool) {
        lock(&self.inner.state).minimized = minimized;
        self.inner.publish();
    }

    /// Submit user input.
    ///
    /// Whitespace-only input is ignored and returns `None`. Otherwise the
    /// trimmed text is appended as a `user` message, written to the store,
    /// and a reply is scheduled.
    pub fn submit(&self, text: &str) -> Option<Message> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let message = Message::new(Sender::User, text);
        let chat_id = {
            let mut state = lock(&self.inner.state);
            let chat_id = self.inner.ensure_initialized(&mut state);
            state.append(message.clone());
            chat_id
        };
        self.inner.publish();

        self.inner.store_user_message(&chat_id, &message);

        lock(&self.inner.state).pending_replies += 1;
        self.inner.publish();

        self.schedule_reply(ReplyJob {
            chat_id,
            user_text: message.text.clone(),
            delay: self.inner.pick_reply_delay(),
        });

        Some(message)
    }

    /// Check the store once for a new agent message. The poll task calls
    /// this every `poll_interval`.
    pub fn poll_external(&self) -> Option<Message> {
        self.inner.poll_external()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        lock(&self.inner.state).snapshot()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.inner.state).messages.clone()
    }

    pub fn chat_id(&self) -> Option<String> {
        lock(&self.inner.state).chat_id.clone()
    }

    pub fn is_typing(&self) -> bool {
        lock(&self.inner.state).pending_replies > 0
    }

    pub fn is_agent_connected(&self) -> bool {
        lock(&self.inner.state).agent_connected
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poll_task)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn start_polling(&self) {
        let mut slot = lock(&self.poll_task);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let period = inner.config.poll_interval();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.poll_external();
            }
        }));
    }

    fn schedule_reply(&self, job: ReplyJob) {
        if !self.inner.config.serialize_replies {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(job.delay).await;
                inner.produce_reply(&job.chat_id, &job.user_text);
            });
            return;
        }

        let mut slot = lock(&self.reply_tx);
        let job = match slot.as_ref() {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_reply_worker(Arc::clone(&self.inner), rx));
        // The receiver was just created, so this send cannot fail.
        let _ = tx.send(job);
        *slot = Some(tx);
    }
}

impl Drop for SupportChat {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.poll_task).take() {
            task.abort();
        }
    }
}

/// Produce queued replies one at a time, in submission order.
///
/// Exits once the session is dropped and the queue is drained.
async fn run_reply_worker(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<ReplyJob>) {
    while let Some(job) = rx.recv().await {
        tokio::time::sleep(job.delay).await;
        inner.produce_reply(&job.chat_id, &job.user_text);
    }
}
