//! Shared state for the HTTP server.
//!
//! Wraps the desk context and the bearer tokens issued by `/api/auth/mpin`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use signaldesk_core::access::Role;
use signaldesk_core::DeskContext;

struct IssuedToken {
    role: Role,
    issued_at: Instant,
}

/// Shared state available to all HTTP handlers.
pub struct HttpSharedState {
    pub context: DeskContext,
    tokens: RwLock<HashMap<String, IssuedToken>>,
    token_ttl: Duration,
}

impl HttpSharedState {
    pub fn new(context: DeskContext) -> Self {
        let token_ttl = context
            .config
            .access
            .session_ttl()
            .to_std()
            .unwrap_or_default();
        Self {
            context,
            tokens: RwLock::new(HashMap::new()),
            token_ttl,
        }
    }

    /// Mint a bearer token for a freshly unlocked console.
    pub fn issue_token(&self, role: Role) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.retain(|_, t| t.issued_at.elapsed() < self.token_ttl);
            tokens.insert(
                token.clone(),
                IssuedToken {
                    role,
                    issued_at: Instant::now(),
                },
            );
        }
        token
    }

    /// Role behind a live token.
    pub fn token_role(&self, token: &str) -> Option<Role> {
        let tokens = self.tokens.read().ok()?;
        tokens
            .get(token)
            .filter(|t| t.issued_at.elapsed() < self.token_ttl)
            .map(|t| t.role)
    }

    pub fn validate_token(&self, token: Option<&str>) -> bool {
        token.and_then(|t| self.token_role(t)).is_some()
    }

    pub fn revoke_token(&self, token: &str) -> bool {
        self.tokens
            .write()
            .map(|mut tokens| tokens.remove(token).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates() {
        let state = HttpSharedState::new(DeskContext::default());
        let token = state.issue_token(Role::CustomerService);

        assert!(state.validate_token(Some(&token)));
        assert_eq!(state.token_role(&token), Some(Role::CustomerService));
        assert!(!state.validate_token(Some("made-up")));
        assert!(!state.validate_token(None));
    }

    #[test]
    fn revoked_token_is_rejected() {
        let state = HttpSharedState::new(DeskContext::default());
        let token = state.issue_token(Role::Admin);

        assert!(state.revoke_token(&token));
        assert!(!state.validate_token(Some(&token)));
        assert!(!state.revoke_token(&token));
    }
}
