//! Client error taxonomy.
//!
//! Callers branch on three families: transport failures (worth retrying at
//! the caller's discretion), structured service rejections (never worth
//! retrying as-is) and local misconfiguration.

use thiserror::Error;

use realitycap_auth::AuthError;
use realitycap_core::{ErrorEnvelope, JobType, ServiceErrorBody, ServiceKind};

pub type ClientResult<T> = Result<T, ClientError>;

/// The request did not produce a usable response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Decode(String),

    /// Non-2xx response other than a structured 4xx rejection, such as a
    /// 5xx or a gateway page.
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Structured error body of a [`TransportError::Status`], if it had one.
    pub fn error_body(&self) -> Option<ServiceErrorBody> {
        match self {
            TransportError::Status { body, .. } => serde_json::from_str::<ErrorEnvelope>(body)
                .ok()
                .map(|envelope| envelope.error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// 4xx response carrying a structured `{ error: { code, message } }` body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("service rejected request (HTTP {status}): {body}")]
pub struct ServiceError {
    pub status: u16,
    pub body: ServiceErrorBody,
}

impl ServiceError {
    pub fn code(&self) -> &str {
        &self.body.code
    }

    /// 4xx: the request itself was rejected (validation, not found, conflict).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error("job type {job_type} belongs to {expected}, not {actual}")]
    WrongService {
        job_type: JobType,
        expected: ServiceKind,
        actual: ServiceKind,
    },

    #[error("no client registered for service {0}")]
    NoService(ServiceKind),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Only transport failures may succeed on a later attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn service_code(&self) -> Option<&str> {
        match self {
            ClientError::Service(err) => Some(err.code()),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Service(err) => Some(err.status),
            ClientError::Transport(TransportError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }
}
