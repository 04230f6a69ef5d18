//! Client configuration.
//!
//! Configuration is always passed explicitly into constructors. The
//! environment is only consulted through [`ClientConfig::from_env`], which
//! callers opt into.

use std::time::Duration;

use realitycap_core::ServiceKind;

use crate::error::{ClientError, ClientResult};

/// Media type expected by the iTwin platform APIs.
pub const DEFAULT_ACCEPT: &str = "application/vnd.bentley.itwin-platform.v1+json";

pub const ENV_BASE_URL: &str = "REALITYCAP_BASE_URL";
pub const ENV_URL_PREFIX: &str = "IMJS_URL_PREFIX";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "REALITYCAP_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, e.g. `https://api.bentley.com`. Service paths are appended.
    pub base_url: String,
    /// Deployment prefix (`""`, `"qa-"`, `"dev-"`) the base URL was built from.
    pub environment_prefix: String,
    pub accept: String,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            environment_prefix: String::new(),
            accept: DEFAULT_ACCEPT.to_string(),
            request_timeout: None,
        }
    }

    /// `https://{prefix}api.bentley.com`. A missing trailing dash is added
    /// (`"qa"` and `"qa-"` are equivalent).
    pub fn for_environment(prefix: &str) -> Self {
        let prefix = normalize_prefix(prefix);
        let mut config = Self::new(format!("https://{prefix}api.bentley.com"));
        config.environment_prefix = prefix;
        config
    }

    /// Build from process environment variables.
    ///
    /// `REALITYCAP_BASE_URL` wins over `IMJS_URL_PREFIX`; with neither set the
    /// production endpoint is used.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let mut config = match lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            Some(url) => Self::new(url.trim()),
            None => Self::for_environment(&lookup(ENV_URL_PREFIX).unwrap_or_default()),
        };

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!(
                    "{ENV_REQUEST_TIMEOUT_SECS} must be a number, got {raw:?}"
                ))
            })?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            ClientError::Config(format!("invalid base url {:?}: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base url must be http(s), got {:?}",
                self.base_url
            )));
        }
        if self.accept.trim().is_empty() {
            return Err(ClientError::Config("accept header must not be empty".to_string()));
        }
        Ok(())
    }

    /// Root URL of one service, without a trailing slash.
    pub fn service_url(&self, service: ServiceKind) -> ClientResult<String> {
        self.validate()?;
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), service.path()))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_environment("")
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() || prefix.ends_with('-') {
        prefix.to_string()
    } else {
        format!("{prefix}-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_prefix_builds_host() {
        assert_eq!(ClientConfig::for_environment("").base_url, "https://api.bentley.com");
        assert_eq!(ClientConfig::for_environment("qa").base_url, "https://qa-api.bentley.com");
        assert_eq!(ClientConfig::for_environment("dev-").environment_prefix, "dev-");
    }

    #[test]
    fn service_url_joins_without_double_slash() {
        let config = ClientConfig::new("http://127.0.0.1:8080/");
        assert_eq!(
            config.service_url(ServiceKind::RealityAnalysis).unwrap(),
            "http://127.0.0.1:8080/realitydataanalysis"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = ClientConfig::new("not a url")
            .service_url(ServiceKind::ContextCapture)
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(ClientConfig::new("ftp://host").validate().is_err());
    }

    #[test]
    fn base_url_variable_wins_over_prefix() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "http://localhost:9000"),
            (ENV_URL_PREFIX, "qa-"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");

        let config = ClientConfig::from_lookup(lookup(&[(ENV_URL_PREFIX, "qa-")])).unwrap();
        assert_eq!(config.base_url, "https://qa-api.bentley.com");

        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn request_timeout_must_be_numeric() {
        let config =
            ClientConfig::from_lookup(lookup(&[(ENV_REQUEST_TIMEOUT_SECS, "30")])).unwrap();
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));

        let err =
            ClientConfig::from_lookup(lookup(&[(ENV_REQUEST_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
