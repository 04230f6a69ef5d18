//! Token providers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::token::{AccessToken, AuthError, validate_window};

/// Supplies a bearer token for each outgoing request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, AuthError>;
}

#[async_trait]
impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        (**self).access_token().await
    }
}

/// A token injected by the caller (scripts, tests).
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }

    pub fn from_token(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        validate_window(&self.token, Utc::now())?;
        Ok(self.token.clone())
    }
}

/// Something that can mint a fresh token (an OAuth client, a CLI login).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError>;
}

/// Caches the token from a [`TokenSource`] and refetches it shortly before
/// it expires.
pub struct CachedTokenProvider<S> {
    source: S,
    skew: Duration,
    cached: RwLock<Option<AccessToken>>,
}

impl<S: TokenSource> CachedTokenProvider<S> {
    pub const DEFAULT_SKEW_SECS: i64 = 60;

    pub fn new(source: S) -> Self {
        Self::with_skew(source, Duration::seconds(Self::DEFAULT_SKEW_SECS))
    }

    pub fn with_skew(source: S, skew: Duration) -> Self {
        Self {
            source,
            skew,
            cached: RwLock::new(None),
        }
    }

    /// Drop the cached token; the next call refetches.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    fn fresh(&self, token: &Option<AccessToken>) -> Option<AccessToken> {
        token
            .as_ref()
            .filter(|t| !t.expires_within(Utc::now(), self.skew))
            .cloned()
    }
}

#[async_trait]
impl<S: TokenSource> TokenProvider for CachedTokenProvider<S> {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.fresh(&*self.cached.read().await) {
            return Ok(token);
        }

        let mut guard = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.fresh(&guard) {
            return Ok(token);
        }

        tracing::debug!("refreshing access token");
        let token = self.source.fetch_token().await?;
        validate_window(&token, Utc::now())?;
        *guard = Some(token.clone());
        Ok(token)
    }
}
