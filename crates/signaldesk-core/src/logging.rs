//! Per-conversation transcript files.
//!
//! Each conversation can mirror its messages to `{dir}/{chat_id}.log`,
//! one timestamped line per message. Failures are ignored.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

use crate::chat::{Message, Sender};
use crate::persistence::blob::validate_key;

/// Thread-safe handle to an append-only transcript file.
pub type TranscriptHandle = Arc<Mutex<Option<File>>>;

/// A handle that writes nowhere.
pub fn disabled() -> TranscriptHandle {
    Arc::new(Mutex::new(None))
}

fn direction(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "USER",
        Sender::Bot => "BOT",
        Sender::Agent => "AGENT",
    }
}

/// Write a timestamped line (if a file is open).
pub fn log_line(handle: &TranscriptHandle, direction: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            let _ = writeln!(file, "[{}] {}: {}", ts, direction, data);
            let _ = file.flush();
        }
    }
}

/// Record one chat message.
pub fn log_message(handle: &TranscriptHandle, message: &Message) {
    log_line(handle, direction(message.sender), &message.text);
}

/// Open (or create) `{dir}/{chat_id}.log` and return a shared handle.
///
/// Ids that do not form a single file name inside `dir` get a disabled handle.
pub fn open_transcript(dir: Option<&str>, chat_id: &str) -> TranscriptHandle {
    let file = dir.and_then(|dir| {
        let file_name = format!("{}.log", chat_id);
        if validate_key(&file_name).is_err() {
            log::warn!("Not writing transcript for unsafe chat id {:?}", chat_id);
            return None;
        }
        let path = Path::new(dir).join(file_name);
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    Arc::new(Mutex::new(file))
}
