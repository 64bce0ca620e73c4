//! The `Integration` trait shared by every vendor client.
//!
//! The only contract a vendor API has with the rest of the system is
//! "send an authenticated HTTP request, get back JSON". Both
//! [`BaseIntegration`](crate::base::BaseIntegration) and
//! [`OAuth2Integration`](crate::oauth::OAuth2Integration) implement it.

use crate::circuit_breaker::CircuitSnapshot;
use crate::error::IntegrationResult;
use crate::rate_limit::RateLimitSnapshot;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Query string pairs.
pub type Query = [(String, String)];

/// An authenticated client for one vendor API.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Integration name.
    fn name(&self) -> &str;

    /// Send a request and decode the JSON response (`null` when empty).
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&serde_json::Value>,
    ) -> IntegrationResult<serde_json::Value>;

    /// Circuit, rate-limit and request statistics.
    fn status(&self) -> IntegrationStatus;

    /// Single un-retried request against the health path.
    async fn test_connection(&self) -> IntegrationResult<()>;

    /// GET helper.
    async fn get(&self, path: &str, query: &Query) -> IntegrationResult<serde_json::Value> {
        self.request(Method::GET, path, query, None).await
    }

    /// POST helper.
    async fn post(&self, path: &str, body: &serde_json::Value) -> IntegrationResult<serde_json::Value> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    /// PUT helper.
    async fn put(&self, path: &str, body: &serde_json::Value) -> IntegrationResult<serde_json::Value> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    /// PATCH helper.
    async fn patch(&self, path: &str, body: &serde_json::Value) -> IntegrationResult<serde_json::Value> {
        self.request(Method::PATCH, path, &[], Some(body)).await
    }

    /// DELETE helper.
    async fn delete(&self, path: &str) -> IntegrationResult<serde_json::Value> {
        self.request(Method::DELETE, path, &[], None).await
    }
}

/// Authentication scheme in use, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// Static credentials (API key, basic, bearer).
    Static,
    /// OAuth2 access tokens.
    OAuth2,
}

/// Status of one integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationStatus {
    /// Integration name.
    pub name: String,

    /// API base URL.
    pub base_url: String,

    /// Authentication scheme.
    pub auth: AuthKind,

    /// Whether a usable OAuth2 token is cached (OAuth2 only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_valid: Option<bool>,

    /// Circuit breaker state.
    pub circuit: CircuitSnapshot,

    /// Rate limiter usage.
    pub rate_limit: RateLimitSnapshot,

    /// Request statistics.
    pub stats: RequestStatsSnapshot,
}

/// Request counters for one integration.
#[derive(Debug, Default)]
pub struct RequestStats {
    total: AtomicU64,
    failed: AtomicU64,
    total_latency_ms: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl RequestStats {
    /// Record one completed request.
    pub fn record(&self, latency: Duration, success: bool) {
        let latency_ms = latency.as_millis() as u64;
        self.total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Current counters.
    pub fn snapshot(&self) -> RequestStatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        RequestStatsSnapshot {
            total_requests: total,
            failed_requests: failed,
            avg_latency_ms: if total > 0 {
                total_latency as f64 / total as f64
            } else {
                0.0
            },
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
            success_rate: if total > 0 {
                (total - failed) as f64 / total as f64
            } else {
                1.0
            },
        }
    }
}

/// Serializable request counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestStatsSnapshot {
    /// Requests sent.
    pub total_requests: u64,

    /// Requests that ended in an error.
    pub failed_requests: u64,

    /// Mean latency in milliseconds.
    pub avg_latency_ms: f64,

    /// Latency of the most recent request.
    pub last_latency_ms: u64,

    /// Success rate (0.0 - 1.0).
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::default();
        assert_eq!(stats.snapshot().success_rate, 1.0);

        stats.record(Duration::from_millis(100), true);
        stats.record(Duration::from_millis(300), false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.avg_latency_ms, 200.0);
        assert_eq!(snapshot.last_latency_ms, 300);
        assert_eq!(snapshot.success_rate, 0.5);
    }
}
