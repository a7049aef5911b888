//! Route gating for the web app.
//!
//! `/admin/*` needs the admin PIN, `/customer-service/*` needs the
//! customer-service PIN and everything else needs a signed-in user. The PIN
//! entry pages and the sign-in page themselves are always reachable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pin::{PinGate, Role};
use crate::chat::Identity;

pub const SIGNIN_PATH: &str = "/signin";

/// Minimal view of the signed-in end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub identity: Identity,
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum GuardDecision {
    Allow,
    Redirect { to: String, from: String },
}

/// Which gate protects a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Public,
    Pin(Role),
    User,
}

fn under(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Classify a request path. Trailing slashes are ignored.
pub fn classify(path: &str) -> RouteKind {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    if path == SIGNIN_PATH {
        return RouteKind::Public;
    }

    for role in [Role::Admin, Role::CustomerService] {
        let root = role.login_path();
        if path == root {
            return RouteKind::Public;
        }
        if under(path, root) {
            return RouteKind::Pin(role);
        }
    }

    RouteKind::User
}

pub struct RouteGuard<'a> {
    gate: &'a PinGate,
}

impl<'a> RouteGuard<'a> {
    pub fn new(gate: &'a PinGate) -> Self {
        Self { gate }
    }

    /// Decide whether `path` may render for `user` at `now`.
    pub fn check(
        &self,
        path: &str,
        user: Option<&UserSession>,
        now: DateTime<Utc>,
    ) -> GuardDecision {
        let redirect = |to: &str| GuardDecision::Redirect {
            to: to.to_string(),
            from: path.to_string(),
        };

        match classify(path) {
            RouteKind::Public => GuardDecision::Allow,
            RouteKind::Pin(role) => {
                if self.gate.is_unlocked(role, now) {
                    GuardDecision::Allow
                } else {
                    log::debug!("{} PIN required for {}", role, path);
                    redirect(role.login_path())
                }
            }
            RouteKind::User => match user {
                Some(session) if session.is_authenticated => GuardDecision::Allow,
                _ => redirect(SIGNIN_PATH),
            },
        }
    }
}
