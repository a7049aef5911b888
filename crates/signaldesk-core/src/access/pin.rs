//! M-PIN gate for the admin and customer-service consoles.
//!
//! A successful unlock stores two flags in the shared [`BlobStore`]:
//!
//! ```text
//! <role>_mpin_authenticated = "true"
//! <role>_mpin_timestamp     = <unix millis of the unlock>
//! ```
//!
//! The unlock stays valid for `session_ttl_hours`. This is a placeholder
//! gate, not a security boundary.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AccessConfig;
use crate::persistence::{BlobStore, StoreError};

pub const PIN_LENGTH: usize = 6;

/// Which console a PIN unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    CustomerService,
}

impl Role {
    fn key_prefix(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::CustomerService => "customer_service",
        }
    }

    pub fn authenticated_key(self) -> String {
        format!("{}_mpin_authenticated", self.key_prefix())
    }

    pub fn timestamp_key(self) -> String {
        format!("{}_mpin_timestamp", self.key_prefix())
    }

    /// The PIN entry page.
    pub fn login_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::CustomerService => "/customer-service",
        }
    }

    /// Where a successful unlock lands.
    pub fn dashboard_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::CustomerService => "/customer-service/dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "Admin"),
            Role::CustomerService => write!(f, "Customer service"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "customer_service" | "customer-service" => Ok(Role::CustomerService),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("M-PIN must be exactly {PIN_LENGTH} digits")]
    IncompletePin,

    #[error("Invalid M-PIN. Access denied.")]
    InvalidPin,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Apply a keystroke-level edit to the PIN field.
///
/// Non-digits are stripped. If the result would exceed [`PIN_LENGTH`]
/// digits the edit is rejected and `current` is kept.
pub fn normalize_pin_input(current: &str, raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= PIN_LENGTH {
        digits
    } else {
        current.to_string()
    }
}

pub struct PinGate {
    blobs: Arc<dyn BlobStore>,
    config: AccessConfig,
}

impl PinGate {
    pub fn new(blobs: Arc<dyn BlobStore>, config: AccessConfig) -> Self {
        Self { blobs, config }
    }

    fn expected_pin(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.config.admin_pin,
            Role::CustomerService => &self.config.customer_service_pin,
        }
    }

    /// Validate a PIN without recording anything.
    pub fn check_pin(&self, role: Role, pin: &str) -> Result<(), AccessError> {
        if pin.len() != PIN_LENGTH || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(AccessError::IncompletePin);
        }
        if pin != self.expected_pin(role) {
            return Err(AccessError::InvalidPin);
        }
        Ok(())
    }

    /// Verify after the configured delay and record the unlock.
    ///
    /// Returns the dashboard path to navigate to.
    pub async fn authenticate(&self, role: Role, pin: &str) -> Result<&'static str, AccessError> {
        tokio::time::sleep(self.config.verify_delay()).await;
        self.unlock(role, pin, Utc::now())
    }

    /// Verify immediately and record the unlock at `now`.
    pub fn unlock(
        &self,
        role: Role,
        pin: &str,
        now: DateTime<Utc>,
    ) -> Result<&'static str, AccessError> {
        log::info!("{} M-PIN authentication attempt", role);

        if let Err(e) = self.check_pin(role, pin) {
            log::warn!("Failed {} M-PIN attempt: {}", role, e);
            return Err(e);
        }

        self.blobs.set(&role.authenticated_key(), "true")?;
        self.blobs
            .set(&role.timestamp_key(), &now.timestamp_millis().to_string())?;

        log::info!("{} M-PIN authentication successful", role);
        Ok(role.dashboard_path())
    }

    /// True while a recorded unlock is younger than the session TTL.
    ///
    /// Unreadable or malformed flags count as locked.
    pub fn is_unlocked(&self, role: Role, now: DateTime<Utc>) -> bool {
        let flag = self.blobs.get(&role.authenticated_key()).ok().flatten();
        if flag.as_deref() != Some("true") {
            return false;
        }

        let unlocked_at = self
            .blobs
            .get(&role.timestamp_key())
            .ok()
            .flatten()
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        let ttl = self.config.session_ttl().num_milliseconds();
        unlocked_at
            .and_then(|millis| now.timestamp_millis().checked_sub(millis))
            .is_some_and(|age| age < ttl)
    }

    /// Forget the unlock for `role`.
    pub fn lock(&self, role: Role) -> Result<(), AccessError> {
        self.blobs.remove(&role.authenticated_key())?;
        self.blobs.remove(&role.timestamp_key())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryBlobStore;
    use chrono::Duration;

    fn gate() -> (Arc<MemoryBlobStore>, PinGate) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let config = AccessConfig {
            verify_delay_ms: 1000,
            ..AccessConfig::default()
        };
        (blobs.clone(), PinGate::new(blobs, config))
    }

    mod input {
        use super::*;

        #[test]
        fn strips_non_digits() {
            assert_eq!(normalize_pin_input("", "12a3-4"), "1234");
        }

        #[test]
        fn rejects_seventh_digit() {
            assert_eq!(normalize_pin_input("180623", "1806231"), "180623");
        }

        #[test]
        fn allows_deletion() {
            assert_eq!(normalize_pin_input("180623", "18062"), "18062");
        }
    }

    mod role {
        use super::*;

        #[test]
        fn storage_keys() {
            assert_eq!(Role::Admin.authenticated_key(), "admin_mpin_authenticated");
            assert_eq!(
                Role::CustomerService.timestamp_key(),
                "customer_service_mpin_timestamp"
            );
        }

        #[test]
        fn parses_both_spellings() {
            assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
            assert_eq!("customer-service".parse::<Role>(), Ok(Role::CustomerService));
            assert_eq!("customer_service".parse::<Role>(), Ok(Role::CustomerService));
            assert!("root".parse::<Role>().is_err());
        }
    }

    mod unlock {
        use super::*;

        #[test]
        fn correct_pin_records_flags() {
            let (blobs, gate) = gate();
            let now = Utc::now();

            let dest = gate.unlock(Role::Admin, "180623", now).unwrap();
            assert_eq!(dest, "/admin/dashboard");
            assert_eq!(
                blobs.get("admin_mpin_authenticated").unwrap().as_deref(),
                Some("true")
            );
            assert_eq!(
                blobs.get("admin_mpin_timestamp").unwrap(),
                Some(now.timestamp_millis().to_string())
            );
        }

        #[test]
        fn pins_are_not_interchangeable() {
            let (_, gate) = gate();
            assert!(matches!(
                gate.unlock(Role::Admin, "061823", Utc::now()),
                Err(AccessError::InvalidPin)
            ));
            assert_eq!(
                gate.unlock(Role::CustomerService, "061823", Utc::now()).unwrap(),
                "/customer-service/dashboard"
            );
        }

        #[test]
        fn short_or_non_numeric_pin_is_incomplete() {
            let (blobs, gate) = gate();
            for pin in ["", "12345", "1234567", "18062a"] {
                assert!(matches!(
                    gate.unlock(Role::Admin, pin, Utc::now()),
                    Err(AccessError::IncompletePin)
                ));
            }
            assert_eq!(blobs.get("admin_mpin_authenticated").unwrap(), None);
        }

        #[test]
        fn invalid_pin_message() {
            assert_eq!(
                AccessError::InvalidPin.to_string(),
                "Invalid M-PIN. Access denied."
            );
        }

        #[tokio::test(start_paused = true)]
        async fn authenticate_waits_for_verify_delay() {
            let (_, gate) = gate();
            let started = tokio::time::Instant::now();

            let dest = gate.authenticate(Role::Admin, "180623").await.unwrap();

            assert_eq!(dest, "/admin/dashboard");
            assert!(started.elapsed() >= std::time::Duration::from_millis(1000));
        }
    }

    mod validity {
        use super::*;

        #[test]
        fn unlock_expires_after_ttl() {
            let (_, gate) = gate();
            let at = Utc::now();
            gate.unlock(Role::CustomerService, "061823", at).unwrap();

            assert!(gate.is_unlocked(Role::CustomerService, at + Duration::hours(23)));
            assert!(!gate.is_unlocked(Role::CustomerService, at + Duration::hours(24)));
            assert!(!gate.is_unlocked(Role::Admin, at));
        }

        #[test]
        fn malformed_timestamp_is_locked() {
            let (blobs, gate) = gate();
            blobs.set("admin_mpin_authenticated", "true").unwrap();
            blobs.set("admin_mpin_timestamp", "yesterday").unwrap();

            assert!(!gate.is_unlocked(Role::Admin, Utc::now()));
        }

        #[test]
        fn extreme_timestamps_are_locked() {
            let (blobs, gate) = gate();
            blobs.set("admin_mpin_authenticated", "true").unwrap();

            blobs
                .set("admin_mpin_timestamp", &i64::MIN.to_string())
                .unwrap();
            assert!(!gate.is_unlocked(Role::Admin, Utc::now()));

            blobs
                .set("admin_mpin_timestamp", &i64::MAX.to_string())
                .unwrap();
            let before_epoch = DateTime::from_timestamp_millis(-2).unwrap();
            assert!(!gate.is_unlocked(Role::Admin, before_epoch));
        }

        #[test]
        fn lock_clears_flags() {
            let (_, gate) = gate();
            let now = Utc::now();
            gate.unlock(Role::Admin, "180623", now).unwrap();
            gate.lock(Role::Admin).unwrap();

            assert!(!gate.is_unlocked(Role::Admin, now));
        }
    }
}
