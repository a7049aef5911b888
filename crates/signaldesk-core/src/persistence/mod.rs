//! Persistence layer for conversations and access flags.
//!
//! # Overview
//!
//! Everything SignalDesk persists goes through a [`BlobStore`], a plain
//! string key/value store. On disk it looks like:
//!
//! ```text
//! ~/.signaldesk/                          (or $SIGNALDESK_HOME)
//! ├── config.json                         # DeskConfig
//! └── store/
//!     ├── customer_support_chats.json     # All conversations (JSON array)
//!     ├── admin_mpin_authenticated.json   # "true" while unlocked
//!     └── admin_mpin_timestamp.json       # unix millis of the unlock
//! ```
//!
//! # Design Principles
//!
//! ## Atomic Writes
//!
//! File writes go to a uniquely named temp file in the store directory and
//! are renamed into place, so separate processes never share a temp path.
//!
//! ## Lenient Reads
//!
//! A missing or corrupt conversation blob reads as "no conversations".
//! Callers never crash on bad storage. Writes are stricter: an upsert that
//! cannot read the blob fails instead of saving over it.

pub mod blob;
pub mod conversations;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore, StoreError};
pub use conversations::{
    ConversationMutator, ConversationStore, SharedConversationStore, CONVERSATIONS_KEY,
};
