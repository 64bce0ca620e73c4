//! Generic HTTP client for static-credential vendor APIs.
//!
//! Every request goes through the same pipeline: circuit breaker admission,
//! local rate limit, credentials, send, vendor rate-limit bookkeeping and
//! response classification. The whole attempt is wrapped in the configured
//! retry policy.

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{is_absolute_url, Credentials, IntegrationConfig};
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::{AuthKind, Integration, IntegrationStatus, Query, RequestStats};
use crate::rate_limit::{RateLimitHeaders, RateLimiter};
use crate::retry::with_retry_policy;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

/// Client for one vendor API.
#[derive(Debug)]
pub struct BaseIntegration {
    /// HTTP client instance.
    client: Client,

    /// Integration configuration.
    config: IntegrationConfig,

    breaker: CircuitBreaker,
    limiter: RateLimiter,
    stats: RequestStats,
}

impl BaseIntegration {
    /// Create a client from a validated configuration.
    pub fn new(config: IntegrationConfig) -> IntegrationResult<Self> {
        config
            .validate()
            .map_err(|e| IntegrationError::Config(e.to_string()))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let breaker = CircuitBreaker::new(config.name.clone(), config.circuit_breaker.clone());
        let limiter = match &config.rate_limit {
            Some(limit) => RateLimiter::new(config.name.clone(), limit.clone()),
            None => RateLimiter::unlimited(config.name.clone()),
        };

        Ok(Self {
            client,
            config,
            breaker,
            limiter,
            stats: RequestStats::default(),
        })
    }

    /// Integration configuration.
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Circuit breaker guarding this integration.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Rate limiter for this integration.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Send a request with retries, authenticating with the configured
    /// credentials or, when given, a full `Authorization` header value.
    pub(crate) async fn request_with(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
        authorization: Option<&str>,
    ) -> IntegrationResult<Value> {
        with_retry_policy(&self.config.retry, || {
            self.send_once(method.clone(), path, query, body, authorization)
        })
        .await
    }

    /// One attempt, no retries.
    #[instrument(
        skip_all,
        fields(integration = %self.config.name, method = %method, path = %path)
    )]
    pub(crate) async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
        authorization: Option<&str>,
    ) -> IntegrationResult<Value> {
        if is_absolute_url(path) && !self.config.is_same_origin(path) {
            warn!(integration = %self.config.name, "Refusing link to another host");
            return Err(IntegrationError::InvalidResponse(format!(
                "link leaves {}: {}",
                self.config.base_url, path
            )));
        }

        let permit = self.breaker.allow_request()?;
        self.limiter.try_acquire()?;

        let url = self.config.url(path);
        debug!("Sending {} {}", method, url);

        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        request = match authorization {
            Some(value) => request.header(AUTHORIZATION, value),
            None => self.apply_credentials(request),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let outcome = match request.send().await {
            Ok(response) => self.handle_response(response, path).await,
            Err(e) => Err(IntegrationError::Http(e)),
        };

        match &outcome {
            Err(e) if e.counts_as_outage() => permit.failure(),
            _ => permit.success(),
        }
        self.stats.record(started.elapsed(), outcome.is_ok());

        outcome
    }

    fn apply_credentials(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Credentials::None => request,
            Credentials::Bearer { token } => request.bearer_auth(token),
            Credentials::ApiKeyHeader { header, key } => request.header(header.as_str(), key.as_str()),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::QueryParam { name, key } => request.query(&[(name, key)]),
        }
    }

    async fn handle_response(&self, response: Response, path: &str) -> IntegrationResult<Value> {
        let status = response.status();
        let limits = RateLimitHeaders::from_headers(response.headers());
        self.limiter.observe(&limits);

        if status == StatusCode::UNAUTHORIZED {
            error!(integration = %self.config.name, "Authentication failed");
            return Err(IntegrationError::Unauthorized(self.config.name.clone()));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(IntegrationError::NotFound(path.to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(integration = %self.config.name, "Vendor rate limit hit");
            return Err(IntegrationError::RateLimited {
                integration: self.config.name.clone(),
                retry_after: limits.retry_after.or(limits.reset_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(
                integration = %self.config.name,
                "API error ({}): {}",
                status.as_u16(),
                message
            );
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
    }

    pub(crate) fn status_with(&self, auth: AuthKind, token_valid: Option<bool>) -> IntegrationStatus {
        IntegrationStatus {
            name: self.config.name.clone(),
            base_url: self.config.base_url.clone(),
            auth,
            token_valid,
            circuit: self.breaker.snapshot(),
            rate_limit: self.limiter.snapshot(),
            stats: self.stats.snapshot(),
        }
    }
}

#[async_trait]
impl Integration for BaseIntegration {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> IntegrationResult<Value> {
        self.request_with(method, path, query, body, None).await
    }

    fn status(&self) -> IntegrationStatus {
        self.status_with(AuthKind::Static, None)
    }

    async fn test_connection(&self) -> IntegrationResult<()> {
        self.send_once(Method::GET, &self.config.health_path, &[], None, None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = BaseIntegration::new(IntegrationConfig::new("broken", "not-a-url")).unwrap_err();
        assert!(matches!(err, IntegrationError::Config(_)));
    }

    #[test]
    fn test_status_starts_clean() {
        let integration =
            BaseIntegration::new(IntegrationConfig::new("pendo", "https://app.pendo.io/api/v1"))
                .unwrap();
        let status = integration.status();

        assert_eq!(status.name, "pendo");
        assert_eq!(status.auth, AuthKind::Static);
        assert_eq!(status.stats.total_requests, 0);
        assert_eq!(status.circuit.consecutive_failures, 0);
    }
}
