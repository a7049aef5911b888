//! Desk configuration loaded from `config.json`.
//!
//! Every field has a default, so a partial or missing file is fine:
//!
//! ```json
//! { "chat": { "pollIntervalMs": 500 }, "access": { "sessionTtlHours": 8 } }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signals::SignalSettings;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Longest accepted unlock lifetime (one year).
pub const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeskConfig {
    pub chat: ChatConfig,
    pub access: AccessConfig,
    pub signals: SignalSettings,
}

impl DeskConfig {
    /// Load `{dir}/config.json`, falling back to defaults when it is absent.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        let mut config: DeskConfig = serde_json::from_str(&contents)?;
        config.normalize();
        Ok(config)
    }

    /// Save to `{dir}/config.json` (temp file, then rename).
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        let temp_path = dir.join(format!("{CONFIG_FILE_NAME}.tmp"));
        fs::write(&temp_path, serde_json::to_string_pretty(self)?)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    /// Clamp values into the ranges the components accept.
    pub fn normalize(&mut self) {
        self.chat.normalize();
        self.access.normalize();
        self.signals = self.signals.clone().clamped();
    }
}

/// Support chat timing and behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    /// Lower bound of the simulated reply latency.
    pub reply_delay_min_ms: u64,
    /// Upper bound of the simulated reply latency.
    pub reply_delay_max_ms: u64,
    /// How often an open session re-reads the shared store.
    pub poll_interval_ms: u64,
    /// Name the simulated agent introduces itself with.
    pub agent_name: String,
    /// Produce replies one at a time, in submission order.
    pub serialize_replies: bool,
    /// Merge store-side messages when a closed widget is reopened.
    pub resync_on_reopen: bool,
    /// Directory for per-conversation transcript logs. `None` disables them.
    pub transcript_dir: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reply_delay_min_ms: 1500,
            reply_delay_max_ms: 3500,
            poll_interval_ms: 2000,
            agent_name: "John".to_string(),
            serialize_replies: true,
            resync_on_reopen: true,
            transcript_dir: None,
        }
    }
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn reply_delay_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.reply_delay_min_ms),
            Duration::from_millis(self.reply_delay_max_ms),
        )
    }

    fn normalize(&mut self) {
        if self.reply_delay_max_ms < self.reply_delay_min_ms {
            std::mem::swap(&mut self.reply_delay_min_ms, &mut self.reply_delay_max_ms);
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = ChatConfig::default().poll_interval_ms;
        }
    }
}

/// M-PIN gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfig {
    pub admin_pin: String,
    pub customer_service_pin: String,
    /// How long an unlock stays valid.
    pub session_ttl_hours: u64,
    /// Simulated verification latency.
    pub verify_delay_ms: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_pin: "180623".to_string(),
            customer_service_pin: "061823".to_string(),
            session_ttl_hours: 24,
            verify_delay_ms: 1000,
        }
    }
}

impl AccessConfig {
    /// Unlock lifetime, capped at [`MAX_SESSION_TTL_HOURS`].
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours.min(MAX_SESSION_TTL_HOURS) as i64)
    }

    fn normalize(&mut self) {
        self.session_ttl_hours = self.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS);
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = DeskConfig::load(dir.path()).unwrap();
        assert_eq!(config, DeskConfig::default());
        assert_eq!(config.chat.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.access.admin_pin, "180623");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "chat": { "pollIntervalMs": 500, "agentName": "Maya" } }"#,
        )
        .unwrap();

        let config = DeskConfig::load(dir.path()).unwrap();
        assert_eq!(config.chat.poll_interval_ms, 500);
        assert_eq!(config.chat.agent_name, "Maya");
        assert_eq!(config.chat.reply_delay_min_ms, 1500);
        assert_eq!(config.access.session_ttl_hours, 24);
    }

    #[test]
    fn inverted_delay_window_is_swapped() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "chat": { "replyDelayMinMs": 900, "replyDelayMaxMs": 100 } }"#,
        )
        .unwrap();

        let config = DeskConfig::load(dir.path()).unwrap();
        assert_eq!(config.chat.reply_delay_min_ms, 100);
        assert_eq!(config.chat.reply_delay_max_ms, 900);
    }

    #[test]
    fn out_of_range_session_ttl_is_clamped() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "access": { "sessionTtlHours": 18446744073709551615 } }"#,
        )
        .unwrap();

        let config = DeskConfig::load(dir.path()).unwrap();
        assert_eq!(config.access.session_ttl_hours, MAX_SESSION_TTL_HOURS);
        assert_eq!(config.access.session_ttl(), chrono::Duration::days(365));

        let unclamped = AccessConfig {
            session_ttl_hours: u64::MAX,
            ..AccessConfig::default()
        };
        assert_eq!(unclamped.session_ttl(), chrono::Duration::days(365));

        let mut zero = DeskConfig::default();
        zero.access.session_ttl_hours = 0;
        zero.normalize();
        assert_eq!(zero.access.session_ttl_hours, 1);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{").unwrap();
        assert!(matches!(
            DeskConfig::load(dir.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let mut config = DeskConfig::default();
        config.chat.agent_name = "Priya".to_string();
        config.save(dir.path()).unwrap();

        assert_eq!(DeskConfig::load(dir.path()).unwrap(), config);
    }
}
