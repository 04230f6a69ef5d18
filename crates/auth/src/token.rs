use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Bearer token handed to the services.
///
/// Tokens obtained from iTwin authorization clients are usually already
/// prefixed with `Bearer `; raw tokens are accepted too.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Value for the `Authorization` header, always `Bearer <token>`.
    pub fn authorization_header(&self) -> Result<String, AuthError> {
        let raw = self.value.trim();
        let token = match raw.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => raw[7..].trim_start(),
            _ => raw,
        };
        if token.is_empty() {
            return Err(AuthError::InvalidToken("token is empty".to_string()));
        }
        Ok(format!("Bearer {token}"))
    }

    /// Whether the token expires within `skew` of `now`. Tokens without an
    /// expiry never expire.
    pub fn expires_within(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(at) => now + skew >= at,
            None => false,
        }
    }
}

// Keep the secret out of logs.
impl core::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("access token unavailable: {0}")]
    Unavailable(String),

    #[error("access token has expired")]
    Expired,

    #[error("invalid access token: {0}")]
    InvalidToken(String),
}

/// Check that a token is usable at `now`.
pub fn validate_window(token: &AccessToken, now: DateTime<Utc>) -> Result<(), AuthError> {
    token.authorization_header()?;
    if token.expires_within(now, Duration::zero()) {
        return Err(AuthError::Expired);
    }
    Ok(())
}
