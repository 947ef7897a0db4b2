//! Authentication token types

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Longest lifetime a token is given; larger `expires_in` values are clamped
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

const ONE_YEAR: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// The token currently used to authenticate against the remote API
///
/// Times are monotonic instants taken from the token manager's clock.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
    pub refresh_token: Option<String>,
    pub scopes: Option<Vec<String>>,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, issued_at: Instant, expires_in: Duration) -> Self {
        let lifetime = expires_in.min(MAX_TOKEN_LIFETIME);
        Self {
            token: token.into(),
            issued_at,
            expires_at: issued_at
                .checked_add(lifetime)
                .or_else(|| issued_at.checked_add(ONE_YEAR))
                .unwrap_or(issued_at),
            refresh_token: None,
            scopes: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Option<Vec<String>>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn expires_within(&self, now: Instant, buffer: Duration) -> bool {
        self.remaining(now) <= buffer
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

// Tokens must never end up in logs
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Payload returned by a token refresh
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedToken {
    pub token: String,
    /// Lifetime in seconds; the manager's default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Result of `validate_token`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub expires_soon: bool,
}

/// Lifecycle state of the current token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    NoToken,
    Valid,
    ExpiringSoon,
    Expired,
}

/// Notifications published by the token manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Refreshed,
    RefreshFailed { reason: String },
    Expired,
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_lifetime_is_clamped() {
        let now = Instant::now();
        let token = AuthToken::new("abc", now, Duration::from_secs(u64::MAX));

        assert_eq!(token.remaining(now), MAX_TOKEN_LIFETIME);
        assert!(!token.is_expired(now));
    }

    #[test]
    fn test_expiry_arithmetic() {
        let now = Instant::now();
        let token = AuthToken::new("abc", now, Duration::from_secs(600));

        assert_eq!(token.remaining(now), Duration::from_secs(600));
        assert!(!token.is_expired(now));
        assert!(!token.expires_within(now, Duration::from_secs(300)));
        assert!(token.expires_within(now + Duration::from_secs(300), Duration::from_secs(300)));
        assert!(token.is_expired(now + Duration::from_secs(600)));
        assert_eq!(token.remaining(now + Duration::from_secs(700)), Duration::ZERO);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let token = AuthToken::new("super-secret", Instant::now(), Duration::from_secs(1))
            .with_refresh_token(Some("also-secret".into()));
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret"));
        assert!(token.can_refresh());
    }

    #[test]
    fn test_refreshed_token_optional_fields() {
        let parsed: RefreshedToken = serde_json::from_str(r#"{"token":"t2"}"#).unwrap();
        assert_eq!(parsed.token, "t2");
        assert!(parsed.expires_in.is_none());
        assert!(parsed.refresh_token.is_none());
    }
}
