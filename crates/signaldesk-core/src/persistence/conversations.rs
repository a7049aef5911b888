//! Shared conversation store.
//!
//! All conversations live in one JSON array stored under
//! [`CONVERSATIONS_KEY`]. Both the user widget and the agent console do full
//! read-modify-write cycles on that array, so a concurrent writer can
//! overwrite an append. That loss is accepted: nothing here takes a lock.

use std::sync::Arc;

use super::blob::{BlobStore, StoreError};
use crate::chat::Conversation;

/// Storage key holding the conversation array.
pub const CONVERSATIONS_KEY: &str = "customer_support_chats";

/// Read-modify-write callback for [`ConversationStore::upsert`].
///
/// Receives the current record (if any) and returns the record to store.
/// Returning `None` leaves storage untouched.
pub type ConversationMutator<'a> =
    Box<dyn FnOnce(Option<Conversation>) -> Option<Conversation> + 'a>;

/// Contract the chat session and agent console rely on.
pub trait ConversationStore: Send + Sync {
    /// Fetch one conversation. Unreadable storage counts as absent.
    fn get(&self, chat_id: &str) -> Option<Conversation>;

    /// Read-modify-write one conversation.
    ///
    /// Returns `Ok(true)` when something was written.
    fn upsert(&self, chat_id: &str, mutator: ConversationMutator<'_>) -> Result<bool, StoreError>;

    /// Every stored conversation, in storage order (newest first).
    fn list_all(&self) -> Vec<Conversation>;
}

/// [`ConversationStore`] over any [`BlobStore`].
#[derive(Clone)]
pub struct SharedConversationStore {
    blobs: Arc<dyn BlobStore>,
    key: String,
}

impl SharedConversationStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_key(blobs, CONVERSATIONS_KEY)
    }

    pub fn with_key(blobs: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            blobs,
            key: key.into(),
        }
    }

    fn load(&self) -> Result<Vec<Conversation>, StoreError> {
        match self.blobs.get(&self.key)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Load for a write. Read errors propagate so nothing is saved over
    /// records we could not see; a blob that fails to decode is replaced.
    fn load_for_write(&self) -> Result<Vec<Conversation>, StoreError> {
        let Some(raw) = self.blobs.get(&self.key)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("Replacing corrupt conversation store: {e}");
            Vec::new()
        }))
    }

    /// Like `load`, but unreadable or corrupt storage is an empty list.
    fn load_lenient(&self) -> Vec<Conversation> {
        self.load().unwrap_or_else(|e| {
            log::warn!("Treating unreadable conversation store as empty: {e}");
            Vec::new()
        })
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StoreError> {
        let json = serde_json::to_string(conversations)?;
        self.blobs.set(&self.key, &json)
    }
}

impl ConversationStore for SharedConversationStore {
    fn get(&self, chat_id: &str) -> Option<Conversation> {
        self.load_lenient()
            .into_iter()
            .find(|c| c.chat_id == chat_id)
    }

    fn upsert(&self, chat_id: &str, mutator: ConversationMutator<'_>) -> Result<bool, StoreError> {
        let mut conversations = self.load_for_write()?;
        let index = conversations.iter().position(|c| c.chat_id == chat_id);
        let current = index.map(|i| conversations[i].clone());

        let Some(mut updated) = mutator(current) else {
            return Ok(false);
        };
        updated.chat_id = chat_id.to_string();

        match index {
            Some(i) => conversations[i] = updated,
            // New conversations go to the front of the list.
            None => conversations.insert(0, updated),
        }

        self.save(&conversations)?;
        Ok(true)
    }

    fn list_all(&self) -> Vec<Conversation> {
        self.load_lenient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Identity, Message, Sender};
    use crate::persistence::blob::{FileBlobStore, MemoryBlobStore};
    use tempfile::tempdir;

    fn store() -> (Arc<MemoryBlobStore>, SharedConversationStore) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = SharedConversationStore::new(blobs.clone());
        (blobs, store)
    }

    fn seed(store: &SharedConversationStore, chat_id: &str, text: &str) {
        let first = Message::new(Sender::User, text);
        let id = chat_id.to_string();
        store
            .upsert(
                chat_id,
                Box::new(move |_| Some(Conversation::new(id, &Identity::guest(), first))),
            )
            .unwrap();
    }

    #[test]
    fn get_missing_is_none() {
        let (_, store) = store();
        assert!(store.get("nope").is_none());
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn upsert_creates_then_appends() {
        let (_, store) = store();
        seed(&store, "c1", "hello");

        let wrote = store
            .upsert(
                "c1",
                Box::new(|existing| {
                    let mut conv = existing?;
                    conv.push_and_touch(Message::new(Sender::User, "again"));
                    Some(conv)
                }),
            )
            .unwrap();

        assert!(wrote);
        let conv = store.get("c1").unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.last_message, "again");
    }

    #[test]
    fn mutator_returning_none_writes_nothing() {
        let (blobs, store) = store();
        let wrote = store.upsert("c1", Box::new(|existing| existing)).unwrap();

        assert!(!wrote);
        assert_eq!(blobs.get(CONVERSATIONS_KEY).unwrap(), None);
    }

    #[test]
    fn new_conversations_are_listed_first() {
        let (_, store) = store();
        seed(&store, "older", "a");
        seed(&store, "newer", "b");

        let ids: Vec<_> = store.list_all().into_iter().map(|c| c.chat_id).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[test]
    fn corrupt_blob_reads_as_empty_and_is_replaced_on_write() {
        let (blobs, store) = store();
        blobs.set(CONVERSATIONS_KEY, "{not json").unwrap();

        assert!(store.get("c1").is_none());
        assert!(store.list_all().is_empty());

        seed(&store, "c1", "fresh start");
        assert_eq!(store.list_all().len(), 1);
    }

    /// Fails the next `get` after `fail_next_read` is called.
    struct FlakyBlobStore {
        inner: MemoryBlobStore,
        fail_read: std::sync::atomic::AtomicBool,
    }

    impl FlakyBlobStore {
        fn new() -> Self {
            Self {
                inner: MemoryBlobStore::new(),
                fail_read: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn fail_next_read(&self) {
            self.fail_read
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl BlobStore for FlakyBlobStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.fail_read.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "disk busy",
                )));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn read_error_during_upsert_keeps_existing_conversations() {
        let blobs = Arc::new(FlakyBlobStore::new());
        let store = SharedConversationStore::new(blobs.clone());
        seed(&store, "alice", "hi");
        seed(&store, "bob", "hello");

        blobs.fail_next_read();
        let carol = Message::new(Sender::User, "anyone there?");
        let result = store.upsert(
            "carol",
            Box::new(move |_| Some(Conversation::new("carol", &Identity::guest(), carol))),
        );

        assert!(matches!(result, Err(StoreError::Io(_))));
        let ids: Vec<_> = store.list_all().into_iter().map(|c| c.chat_id).collect();
        assert_eq!(ids, vec!["bob", "alice"]);
    }

    #[test]
    fn stored_layout_is_a_json_array() {
        let (blobs, store) = store();
        seed(&store, "c1", "hello");

        let raw = blobs.get(CONVERSATIONS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["chatId"], "c1");
        assert_eq!(value[0]["messages"][0]["text"], "hello");
    }

    #[test]
    fn file_backed_store_is_visible_across_handles() {
        let dir = tempdir().unwrap();
        let writer = SharedConversationStore::new(Arc::new(FileBlobStore::new(dir.path())));
        let reader = SharedConversationStore::new(Arc::new(FileBlobStore::new(dir.path())));

        seed(&writer, "c1", "cross-process");
        assert_eq!(reader.get("c1").unwrap().last_message, "cross-process");
    }
}
