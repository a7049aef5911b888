//! Core managers for SignalDesk state.
//!
//! These managers hold business logic without any framework-specific
//! dependencies. They are used by:
//! - the local daemon's terminal chat client
//! - the HTTP agent console

pub mod agent_console;
pub mod support_chat;

pub use agent_console::{AgentConsole, ConsoleError};
pub use support_chat::{SupportChat, SupportChatBuilder};
