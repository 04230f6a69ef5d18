//! Authenticated JSON transport bound to one service root.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Url};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use realitycap_auth::TokenProvider;
use realitycap_core::{ErrorEnvelope, ServiceKind};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ServiceError, TransportError};

/// Longest response excerpt kept in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Issues one request per call; no retries, no caching.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    root: String,
    accept: String,
    timeout: Option<Duration>,
    tokens: Arc<dyn TokenProvider>,
}

impl Transport {
    pub fn new(
        config: &ClientConfig,
        service: ServiceKind,
        tokens: Arc<dyn TokenProvider>,
    ) -> ClientResult<Self> {
        Self::with_http_client(reqwest::Client::new(), config, service, tokens)
    }

    /// Share one connection pool between several transports.
    pub fn with_http_client(
        http: reqwest::Client,
        config: &ClientConfig,
        service: ServiceKind,
        tokens: Arc<dyn TokenProvider>,
    ) -> ClientResult<Self> {
        Ok(Self {
            http,
            root: config.service_url(service)?,
            accept: config.accept.clone(),
            timeout: config.request_timeout,
            tokens,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Service root plus `segments`, each percent-encoded as a single path
    /// segment.
    pub fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let invalid = || ClientError::Config(format!("invalid service root {:?}", self.root));
        let mut url = Url::parse(&self.root).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let text = self.send::<()>(Method::GET, segments, None).await?;
        decode(&text)
    }

    pub async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ClientResult<T> {
        let text = self.send(Method::POST, segments, Some(body)).await?;
        decode(&text)
    }

    /// PATCH whose response body, if any, is ignored.
    pub async fn patch<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ClientResult<()> {
        self.send(Method::PATCH, segments, Some(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, segments: &[&str]) -> ClientResult<()> {
        self.send::<()>(Method::DELETE, segments, None).await?;
        Ok(())
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> ClientResult<String> {
        let url = self.url(segments)?;
        let authorization = self.tokens.access_token().await?.authorization_header()?;

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, &self.accept)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        let text = response.text().await.map_err(TransportError::from)?;

        debug!(%method, %url, status = status.as_u16(), "service request");

        if status.is_success() {
            Ok(text)
        } else {
            Err(classify_failure(status.as_u16(), &text))
        }
    }
}

impl core::fmt::Debug for Transport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transport")
            .field("root", &self.root)
            .field("accept", &self.accept)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Only a 4xx with a well-formed error body is a service rejection. A 5xx
/// stays a retriable transport failure even when structured; its body is
/// still readable through [`TransportError::error_body`].
fn classify_failure(status: u16, text: &str) -> ClientError {
    if (400..500).contains(&status) {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(text) {
            return ServiceError {
                status,
                body: envelope.error,
            }
            .into();
        }
    }
    TransportError::Status {
        status,
        body: truncate(text, MAX_ERROR_BODY),
    }
    .into()
}

/// Empty bodies decode as JSON `null` so unit-like responses still parse.
fn decode<T: DeserializeOwned>(text: &str) -> ClientResult<T> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()).into())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
