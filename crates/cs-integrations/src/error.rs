//! Error types for vendor integrations
//!
//! This module defines the errors that can occur while talking to a
//! third-party SaaS API, including transport failures, API error responses,
//! token refresh failures and circuit breaker rejections.

use std::time::Duration;
use thiserror::Error;

/// Integration error types.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// HTTP transport failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the vendor.
        message: String,
    },

    /// Credentials were rejected.
    #[error("Authentication failed for {0}")]
    Unauthorized(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local or vendor-reported rate limit exhausted.
    #[error("Rate limit exceeded for {integration}")]
    RateLimited {
        /// Integration name.
        integration: String,
        /// How long until the budget resets, if known.
        retry_after: Option<Duration>,
    },

    /// Circuit breaker is open; no request was sent.
    #[error("Circuit open for {integration}, requests suspended")]
    CircuitOpen {
        /// Integration name.
        integration: String,
    },

    /// OAuth2 token could not be obtained.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Response body was not the JSON we expected.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Integration is misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for integration operations.
pub type IntegrationResult<T> = Result<T, IntegrationError>;

impl IntegrationError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            IntegrationError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            IntegrationError::Api { status, .. } => *status >= 500,
            IntegrationError::RateLimited { .. } => true,
            IntegrationError::Unauthorized(_)
            | IntegrationError::NotFound(_)
            | IntegrationError::CircuitOpen { .. }
            | IntegrationError::TokenRefresh(_)
            | IntegrationError::InvalidResponse(_)
            | IntegrationError::Config(_) => false,
        }
    }

    /// Whether the failure says something about the vendor's health.
    ///
    /// Client-side mistakes (4xx other than 429) mean the service answered,
    /// so they must not trip the circuit breaker.
    pub fn counts_as_outage(&self) -> bool {
        match self {
            IntegrationError::Http(_) => true,
            IntegrationError::Api { status, .. } => *status >= 500,
            IntegrationError::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Delay hint reported by the vendor or the local limiter.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            IntegrationError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status associated with this error, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            IntegrationError::Http(e) => e.status().map(|s| s.as_u16()),
            IntegrationError::Api { status, .. } => Some(*status),
            IntegrationError::Unauthorized(_) => Some(401),
            IntegrationError::NotFound(_) => Some(404),
            IntegrationError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Stable error code for tool responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            IntegrationError::Http(_) => "HTTP_ERROR",
            IntegrationError::Api { .. } => "API_ERROR",
            IntegrationError::Unauthorized(_) => "UNAUTHORIZED",
            IntegrationError::NotFound(_) => "NOT_FOUND",
            IntegrationError::RateLimited { .. } => "RATE_LIMITED",
            IntegrationError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            IntegrationError::TokenRefresh(_) => "TOKEN_REFRESH_FAILED",
            IntegrationError::InvalidResponse(_) => "INVALID_RESPONSE",
            IntegrationError::Config(_) => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server = IntegrationError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(server.is_retryable());
        assert!(server.counts_as_outage());

        let client = IntegrationError::Api {
            status: 422,
            message: "bad field".into(),
        };
        assert!(!client.is_retryable());
        assert!(!client.counts_as_outage());

        let open = IntegrationError::CircuitOpen {
            integration: "chargebee".into(),
        };
        assert!(!open.is_retryable());
        assert!(!open.counts_as_outage());
    }

    #[test]
    fn test_rate_limited_hint() {
        let err = IntegrationError::RateLimited {
            integration: "freshdesk".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.error_code(), "RATE_LIMITED");
    }
}
