//! # signaldesk-core
//!
//! Core logic for SignalDesk, the trading-signals support desk.
//!
//! This crate is framework-agnostic and is used by:
//! - the HTTP/WebSocket agent console (`signaldesk-http`)
//! - the terminal chat client and signal runner (`signaldesk-daemon`)
//!
//! ## Key Concepts
//!
//! - **SupportChat**: one user's chat widget session with simulated replies
//! - **Conversation**: the shared record both the user and agents read/write
//! - **AgentConsole**: agent-side listing, replies and triage
//! - **PinGate**: M-PIN unlock for the admin and customer-service consoles
//! - **SignalBot**: simulated trading signal generator

pub mod access;
pub mod chat;
pub mod config;
pub mod context;
pub mod event_bus;
pub mod logging;
pub mod managers;
pub mod paths;
pub mod persistence;
pub mod signals;

// Re-export commonly used types
pub use chat::{Conversation, Identity, Message, Sender};
pub use config::DeskConfig;
pub use context::{DeskContext, DeskContextBuilder};
pub use event_bus::{BroadcastEvent, EventBus};
pub use managers::{AgentConsole, SupportChat};
