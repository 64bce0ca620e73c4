//! Integration configuration.
//!
//! Credentials and tuning for each vendor are read from environment
//! variables named after the vendor's prefix, e.g. `CHARGEBEE_API_KEY`,
//! `HUBSPOT_CLIENT_ID`. Every loader also has a `*_from_lookup` variant that
//! takes a closure instead of reading the process environment.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// How requests are authenticated.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// No authentication.
    None,

    /// `Authorization: Bearer <token>`.
    Bearer {
        /// Token value.
        token: String,
    },

    /// Key sent in a vendor-specific header.
    ApiKeyHeader {
        /// Header name.
        header: String,
        /// Key value.
        key: String,
    },

    /// HTTP basic authentication.
    Basic {
        /// Username (often the API key itself).
        username: String,
        /// Password (often empty or a placeholder).
        password: String,
    },

    /// Key sent as a query parameter.
    QueryParam {
        /// Parameter name.
        name: String,
        /// Key value.
        key: String,
    },
}

impl Credentials {
    /// Whether any credential is configured.
    pub fn is_configured(&self) -> bool {
        !matches!(self, Credentials::None)
    }

    /// Short description without secrets.
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::None => "none",
            Credentials::Bearer { .. } => "bearer",
            Credentials::ApiKeyHeader { .. } => "api_key_header",
            Credentials::Basic { .. } => "basic",
            Credentials::QueryParam { .. } => "query_param",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
            Credentials::ApiKeyHeader { header, .. } => f
                .debug_struct("ApiKeyHeader")
                .field("header", header)
                .field("key", &"***")
                .finish(),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", &redact(username))
                .field("password", &"***")
                .finish(),
            Credentials::QueryParam { name, .. } => f
                .debug_struct("QueryParam")
                .field("name", name)
                .field("key", &"***")
                .finish(),
        }
    }
}

fn redact(value: &str) -> String {
    if value.len() > 4 && value.is_char_boundary(4) {
        format!("{}***", &value[..4])
    } else {
        "***".to_string()
    }
}

/// OAuth2 client settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2Settings {
    /// Client ID.
    pub client_id: String,

    /// Client secret.
    pub client_secret: String,

    /// Token endpoint.
    pub token_url: String,

    /// Scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Long-lived refresh token, if the vendor uses the refresh grant.
    pub refresh_token: Option<String>,

    /// Refresh this long before the token actually expires.
    pub refresh_buffer: Duration,
}

impl OAuth2Settings {
    /// Create settings for the client-credentials grant.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
            scopes: Vec::new(),
            refresh_token: None,
            refresh_buffer: Duration::from_secs(60),
        }
    }

    /// Use the refresh-token grant.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Request scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

impl fmt::Debug for OAuth2Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Settings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("refresh_buffer", &self.refresh_buffer)
            .finish()
    }
}

/// Full configuration for one integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Integration name (used in logs and errors).
    pub name: String,

    /// API base URL.
    pub base_url: String,

    /// Static credentials.
    pub credentials: Credentials,

    /// OAuth2 settings; when present an OAuth2 integration is built.
    pub oauth2: Option<OAuth2Settings>,

    /// Request timeout.
    pub timeout: Duration,

    /// Retry behavior.
    pub retry: RetryConfig,

    /// Circuit breaker tuning.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Local rate limit, if any.
    pub rate_limit: Option<RateLimitConfig>,

    /// Path requested by connection tests.
    pub health_path: String,

    /// User-Agent header.
    pub user_agent: String,
}

impl IntegrationConfig {
    /// Create a configuration with default tuning.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            credentials: Credentials::None,
            oauth2: None,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: None,
            health_path: "/".to_string(),
            user_agent: format!("cs-integrations/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set static credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Authenticate with OAuth2.
    pub fn with_oauth2(mut self, settings: OAuth2Settings) -> Self {
        self.oauth2 = Some(settings);
        self
    }

    /// Set the retry behavior.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the circuit breaker tuning.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Set a local rate limit.
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the path requested by connection tests.
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Apply shared defaults.
    pub fn with_defaults(mut self, defaults: &IntegrationDefaults) -> Self {
        self.timeout = defaults.timeout();
        self.retry = self.retry.with_max_attempts(defaults.max_retries);
        self.circuit_breaker.failure_threshold = defaults.circuit_failure_threshold;
        self.circuit_breaker.reset_timeout = Duration::from_secs(defaults.circuit_reset_timeout_secs);
        self
    }

    /// Whether `url` has the same scheme, host and port as the base URL.
    pub fn is_same_origin(&self, url: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(url)) {
            (Ok(base), Ok(other)) => base.origin() == other.origin(),
            _ => false,
        }
    }

    /// Build a full URL by appending a path to the base URL.
    ///
    /// Absolute URLs (e.g. `next` links returned by the vendor) pass through;
    /// the client refuses them unless [`Self::is_same_origin`] holds.
    pub fn url(&self, path: &str) -> String {
        if is_absolute_url(path) {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Validate that the configuration can be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.base_url", self.name),
                message: "base URL is empty".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.base_url", self.name),
                message: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        if let Some(oauth) = &self.oauth2 {
            if oauth.client_id.is_empty() || oauth.token_url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("{}.oauth2", self.name),
                    message: "client id and token URL are required".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Defaults shared by every integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationDefaults {
    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum attempts per request.
    pub max_retries: u32,

    /// Consecutive failures that open a breaker.
    pub circuit_failure_threshold: u32,

    /// Seconds an open breaker waits before probing.
    pub circuit_reset_timeout_secs: u64,
}

impl Default for IntegrationDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            circuit_failure_threshold: 5,
            circuit_reset_timeout_secs: 60,
        }
    }
}

impl IntegrationDefaults {
    /// Load from environment variables.
    ///
    /// Environment variables:
    /// - `INTEGRATION_TIMEOUT_SECS`: Request timeout (default: 30)
    /// - `INTEGRATION_MAX_RETRIES`: Attempts per request (default: 3)
    /// - `CIRCUIT_FAILURE_THRESHOLD`: Failures before opening (default: 5)
    /// - `CIRCUIT_RESET_TIMEOUT_SECS`: Open duration (default: 60)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            timeout_secs: parse_or(&lookup, "INTEGRATION_TIMEOUT_SECS", default.timeout_secs),
            max_retries: parse_or(&lookup, "INTEGRATION_MAX_RETRIES", default.max_retries),
            circuit_failure_threshold: parse_or(
                &lookup,
                "CIRCUIT_FAILURE_THRESHOLD",
                default.circuit_failure_threshold,
            ),
            circuit_reset_timeout_secs: parse_or(
                &lookup,
                "CIRCUIT_RESET_TIMEOUT_SECS",
                default.circuit_reset_timeout_secs,
            ),
        }
    }

    /// Request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Whether `path` is a full `http(s)://` URL rather than a path.
pub(crate) fn is_absolute_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_url_joining() {
        let config = IntegrationConfig::new("test", "https://api.example.com/v2/");
        assert_eq!(config.url("/customers"), "https://api.example.com/v2/customers");
        assert_eq!(config.url("customers"), "https://api.example.com/v2/customers");
        assert_eq!(config.url(""), "https://api.example.com/v2");
        assert_eq!(
            config.url("https://other.example.com/page2"),
            "https://other.example.com/page2"
        );
    }

    #[test]
    fn test_same_origin() {
        let config = IntegrationConfig::new("zendesk", "https://acme.zendesk.com/api/v2");
        assert!(config.is_same_origin("https://acme.zendesk.com/api/v2/users.json?page=2"));
        assert!(config.is_same_origin("https://acme.zendesk.com:443/other"));
        assert!(!config.is_same_origin("https://collector.invalid/api/v2/users.json"));
        assert!(!config.is_same_origin("http://acme.zendesk.com/api/v2/users.json"));
        assert!(!config.is_same_origin("https://acme.zendesk.com.evil.test/"));
        assert!(!config.is_same_origin("/relative"));
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::Basic {
            username: "sk_live_abcdef".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("abcdef"));

        let settings = OAuth2Settings::new("id", "secret-value", "https://auth/token")
            .with_refresh_token("refresh-value");
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("secret-value"));
        assert!(!rendered.contains("refresh-value"));
    }

    #[test]
    fn test_validate() {
        assert!(IntegrationConfig::new("ok", "https://api.example.com").validate().is_ok());
        assert!(IntegrationConfig::new("empty", "").validate().is_err());
        assert!(IntegrationConfig::new("ftp", "ftp://example.com").validate().is_err());

        let bad_oauth = IntegrationConfig::new("oauth", "https://api.example.com")
            .with_oauth2(OAuth2Settings::new("", "secret", ""));
        assert!(bad_oauth.validate().is_err());
    }

    #[test]
    fn test_defaults_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("INTEGRATION_TIMEOUT_SECS", "5"),
            ("CIRCUIT_FAILURE_THRESHOLD", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let defaults = IntegrationDefaults::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(defaults.timeout_secs, 5);
        assert_eq!(defaults.max_retries, 3);
        assert_eq!(defaults.circuit_failure_threshold, 5);

        let config = IntegrationConfig::new("x", "https://x.test").with_defaults(&defaults);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
    }
}
