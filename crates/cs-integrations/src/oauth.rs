//! OAuth2 vendor client.
//!
//! Wraps a [`BaseIntegration`] and authenticates every request with an
//! access token obtained from the vendor's token endpoint. Tokens are
//! refreshed ahead of expiry (the configured buffer), refreshes are
//! single-flight, and a 401 triggers exactly one refresh and retry.
//! Token exchanges share the vendor's circuit breaker and rate limiter.

use crate::base::BaseIntegration;
use crate::config::{IntegrationConfig, OAuth2Settings};
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::{AuthKind, Integration, IntegrationStatus, Query};
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expires in seconds
    pub expires_in: Option<i64>,

    /// Rotated refresh token (if provided)
    pub refresh_token: Option<String>,

    /// Granted scopes
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// A cached access token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Token value.
    pub secret: String,

    /// Authorization scheme the vendor issued the token for.
    pub token_type: String,

    /// Expiry, when the vendor reported one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// A bearer token.
    pub fn bearer(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            token_type: default_token_type(),
            expires_at,
        }
    }

    /// Build from a token response received at `now`.
    ///
    /// An `expires_in` too large to represent is treated as no expiry.
    pub fn from_response(response: &TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_in
            .and_then(|secs| ChronoDuration::try_seconds(secs.max(0)))
            .and_then(|ttl| now.checked_add_signed(ttl));

        Self {
            secret: response.access_token.clone(),
            token_type: response.token_type.clone(),
            expires_at,
        }
    }

    /// Whether the token is still good for at least `buffer`.
    pub fn is_usable(&self, buffer: std::time::Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = ChronoDuration::from_std(buffer).unwrap_or(ChronoDuration::zero());
                now.checked_add_signed(buffer)
                    .is_some_and(|deadline| deadline < expires_at)
            }
            None => true,
        }
    }

    /// `Authorization` header value for this token.
    ///
    /// Vendors commonly return `bearer` in lower case; it is sent as
    /// `Bearer`. Other schemes are sent as issued.
    pub fn authorization(&self) -> String {
        let scheme = self.token_type.trim();
        if scheme.is_empty() || scheme.eq_ignore_ascii_case("bearer") {
            format!("Bearer {}", self.secret)
        } else {
            format!("{} {}", scheme, self.secret)
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"***")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<AccessToken>,
    refresh_token: Option<String>,
}

/// Client for an OAuth2-protected vendor API.
#[derive(Debug)]
pub struct OAuth2Integration {
    base: BaseIntegration,
    settings: OAuth2Settings,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl OAuth2Integration {
    /// Create a client; the configuration must carry OAuth2 settings.
    pub fn new(config: IntegrationConfig) -> IntegrationResult<Self> {
        let settings = config.oauth2.clone().ok_or_else(|| {
            IntegrationError::Config(format!("{} has no OAuth2 settings", config.name))
        })?;
        let refresh_token = settings.refresh_token.clone();

        Ok(Self {
            base: BaseIntegration::new(config)?,
            settings,
            state: RwLock::new(TokenState {
                token: None,
                refresh_token,
            }),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        })
    }

    /// Seed the cache with an access token obtained elsewhere.
    pub async fn with_access_token(self, token: AccessToken) -> Self {
        self.state.write().await.token = Some(token);
        self
    }

    /// Underlying HTTP client.
    pub fn base(&self) -> &BaseIntegration {
        &self.base
    }

    /// Number of token refreshes performed.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Current refresh token (rotated tokens replace the configured one).
    pub async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh_token.clone()
    }

    /// Return a usable access token, refreshing if needed.
    pub async fn access_token(&self) -> IntegrationResult<String> {
        self.current_token().await.map(|token| token.secret)
    }

    async fn current_token(&self) -> IntegrationResult<AccessToken> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        self.refresh().await
    }

    async fn cached_token(&self) -> Option<AccessToken> {
        let state = self.state.read().await;
        state
            .token
            .as_ref()
            .filter(|t| t.is_usable(self.settings.refresh_buffer, Utc::now()))
            .cloned()
    }

    /// Drop the cached token if it is still the one that was rejected.
    async fn invalidate(&self, rejected: &str) {
        let mut state = self.state.write().await;
        if state.token.as_ref().is_some_and(|t| t.secret == rejected) {
            state.token = None;
        }
    }

    /// Call the token endpoint. Caller must hold `refresh_lock`.
    #[instrument(skip(self), fields(integration = %self.base.config().name))]
    async fn refresh(&self) -> IntegrationResult<AccessToken> {
        let refresh_token = self.state.read().await.refresh_token.clone();
        let grant = if refresh_token.is_some() {
            "refresh_token"
        } else {
            "client_credentials"
        };
        debug!(grant, "Requesting access token");

        let response = with_retry_if(
            &RetryConfig::fast(),
            || self.request_token(refresh_token.as_deref()),
            |e: &IntegrationError| e.is_retryable(),
        )
        .await?;

        let token = AccessToken::from_response(&response, Utc::now());

        let mut state = self.state.write().await;
        state.token = Some(token.clone());
        if let Some(rotated) = response.refresh_token {
            state.refresh_token = Some(rotated);
        }
        drop(state);

        self.refreshes.fetch_add(1, Ordering::Relaxed);
        info!(expires_in = ?response.expires_in, "Access token refreshed");

        Ok(token)
    }

    /// One token exchange, admitted by the vendor's breaker and limiter.
    async fn request_token(&self, refresh_token: Option<&str>) -> IntegrationResult<TokenResponse> {
        let permit = self.base.breaker().allow_request()?;
        self.base.limiter().try_acquire()?;

        let outcome = self.exchange(refresh_token).await;
        match &outcome {
            Err(e) if e.counts_as_outage() => permit.failure(),
            _ => permit.success(),
        }
        outcome
    }

    async fn exchange(&self, refresh_token: Option<&str>) -> IntegrationResult<TokenResponse> {
        let scope = self.settings.scopes.join(" ");
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];
        match refresh_token {
            Some(token) => {
                form.push(("grant_type", "refresh_token"));
                form.push(("refresh_token", token));
            }
            None => form.push(("grant_type", "client_credentials")),
        }
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .base
            .http()
            .post(&self.settings.token_url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Token endpoint rejected request");
            return Err(IntegrationError::TokenRefresh(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                message
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| IntegrationError::TokenRefresh(format!("invalid token response: {}", e)))
    }
}

#[async_trait]
impl Integration for OAuth2Integration {
    fn name(&self) -> &str {
        &self.base.config().name
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> IntegrationResult<Value> {
        let token = self.current_token().await?;

        match self
            .base
            .request_with(method.clone(), path, query, body, Some(&token.authorization()))
            .await
        {
            Err(IntegrationError::Unauthorized(_)) => {
                warn!(integration = %self.name(), "Access token rejected, refreshing once");
                self.invalidate(&token.secret).await;
                let token = self.current_token().await?;
                self.base
                    .request_with(method, path, query, body, Some(&token.authorization()))
                    .await
            }
            other => other,
        }
    }

    fn status(&self) -> IntegrationStatus {
        let token_valid = self
            .state
            .try_read()
            .ok()
            .map(|state| {
                state
                    .token
                    .as_ref()
                    .is_some_and(|t| t.is_usable(self.settings.refresh_buffer, Utc::now()))
            });
        self.base.status_with(AuthKind::OAuth2, token_valid)
    }

    async fn test_connection(&self) -> IntegrationResult<()> {
        let token = self.current_token().await?;
        self.base
            .send_once(
                Method::GET,
                &self.base.config().health_path,
                &[],
                None,
                Some(&token.authorization()),
            )
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn response(expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: "tok".into(),
            token_type: "Bearer".into(),
            expires_in,
            refresh_token: None,
            scope: None,
        }
    }

    #[test]
    fn test_token_expiry_with_buffer() {
        let now = Utc::now();
        let token = AccessToken::from_response(&response(Some(3600)), now);

        assert!(token.is_usable(Duration::from_secs(60), now));
        assert!(token.is_usable(Duration::from_secs(60), now + ChronoDuration::seconds(3500)));
        assert!(!token.is_usable(Duration::from_secs(60), now + ChronoDuration::seconds(3541)));
    }

    #[test]
    fn test_token_without_expiry_is_usable() {
        let token = AccessToken::from_response(&response(None), Utc::now());
        assert!(token.is_usable(Duration::from_secs(60), Utc::now() + ChronoDuration::days(365)));
    }

    #[test]
    fn test_huge_expiry_does_not_overflow() {
        let now = Utc::now();
        let token = AccessToken::from_response(&response(Some(i64::MAX)), now);
        assert_eq!(token.expires_at, None);

        let far = AccessToken::bearer("tok", Some(DateTime::<Utc>::MAX_UTC));
        assert!(!far.is_usable(Duration::from_secs(60), DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_authorization_scheme() {
        let mut token = AccessToken::from_response(&response(None), Utc::now());
        assert_eq!(token.authorization(), "Bearer tok");

        token.token_type = "bearer".into();
        assert_eq!(token.authorization(), "Bearer tok");

        token.token_type = "MAC".into();
        assert_eq!(token.authorization(), "MAC tok");
    }

    #[test]
    fn test_token_debug_redacts() {
        let token = AccessToken::from_response(&response(Some(60)), Utc::now());
        assert!(!format!("{:?}", token).contains("tok\""));
    }

    #[test]
    fn test_new_requires_oauth_settings() {
        let err = OAuth2Integration::new(IntegrationConfig::new("hubspot", "https://api.hubapi.com"))
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Config(_)));
    }

    #[test]
    fn test_token_response_defaults() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":120}"#).unwrap();
        assert_eq!(parsed.token_type, "Bearer");
        assert_eq!(parsed.expires_in, Some(120));
    }
}
