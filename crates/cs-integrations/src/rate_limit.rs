//! Fixed-window rate limiting and vendor rate-limit bookkeeping.
//!
//! Each integration owns a [`RateLimiter`] that counts requests in a fixed
//! window. Vendors also report their own budget through response headers;
//! when a vendor says the budget is spent, the limiter refuses requests
//! until the reported reset time.

use crate::error::{IntegrationError, IntegrationResult};
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Longest back-off accepted from a vendor header.
pub const MAX_VENDOR_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Local request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,

    /// Window length.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Budget expressed as requests per minute.
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(120)
    }
}

/// Rate-limit information parsed from a vendor response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Requests left in the vendor's window.
    pub remaining: Option<u32>,

    /// Time until the vendor's window resets.
    pub reset_after: Option<Duration>,

    /// `Retry-After` value.
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parse the common rate-limit headers.
    ///
    /// `X-RateLimit-Reset` is accepted either as seconds-until-reset or as
    /// a Unix timestamp. Delays are capped at [`MAX_VENDOR_DELAY`].
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let number = |name: &str| -> Option<u64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| *v >= 0.0)
                .map(|v| v as u64)
        };

        let remaining = number("x-ratelimit-remaining")
            .or_else(|| number("ratelimit-remaining"))
            .map(|v| v.min(u32::MAX as u64) as u32);

        let delay = |secs: u64| Duration::from_secs(secs.min(MAX_VENDOR_DELAY.as_secs()));

        let reset_after = number("x-ratelimit-reset")
            .or_else(|| number("ratelimit-reset"))
            .map(|value| {
                // Anything this large is an epoch timestamp, not a delta
                if value > 1_000_000_000 {
                    let now = Utc::now().timestamp().max(0) as u64;
                    delay(value.saturating_sub(now))
                } else {
                    delay(value)
                }
            });

        let retry_after = number("retry-after").map(delay);

        Self {
            remaining,
            reset_after,
            retry_after,
        }
    }
}

/// Current limiter usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    /// Requests allowed per window (`None` when unlimited).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Requests counted in the current window.
    pub used: u32,

    /// Milliseconds left in the current window.
    pub window_remaining_ms: u64,

    /// Budget most recently reported by the vendor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_remaining: Option<u32>,

    /// Whether the vendor has told us to back off.
    pub vendor_blocked: bool,
}

#[derive(Debug)]
struct LimiterState {
    window_start: Instant,
    used: u32,
    vendor_remaining: Option<u32>,
    blocked_until: Option<Instant>,
}

/// Fixed-window rate limiter for one integration.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: Option<RateLimitConfig>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter with a local budget.
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self::build(name.into(), Some(config))
    }

    /// Create a limiter that only honours vendor-reported limits.
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    fn build(name: String, config: Option<RateLimitConfig>) -> Self {
        Self {
            name,
            config,
            state: Mutex::new(LimiterState {
                window_start: Instant::now(),
                used: 0,
                vendor_remaining: None,
                blocked_until: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one request against the budget.
    pub fn try_acquire(&self) -> IntegrationResult<()> {
        let now = Instant::now();
        let mut state = self.lock();

        if let Some(until) = state.blocked_until {
            if until > now {
                return Err(self.limited(Some(until - now)));
            }
            state.blocked_until = None;
        }

        let Some(config) = &self.config else {
            return Ok(());
        };

        let elapsed = now.duration_since(state.window_start);
        if elapsed >= config.window {
            state.window_start = now;
            state.used = 0;
        }

        if state.used >= config.max_requests {
            let retry_after = config.window.saturating_sub(now.duration_since(state.window_start));
            debug!(
                integration = %self.name,
                retry_after_ms = retry_after.as_millis(),
                "Local rate limit reached"
            );
            return Err(self.limited(Some(retry_after)));
        }

        state.used += 1;
        Ok(())
    }

    /// Record the budget a vendor reported on a response.
    pub fn observe(&self, headers: &RateLimitHeaders) {
        let now = Instant::now();
        let mut state = self.lock();

        if let Some(remaining) = headers.remaining {
            state.vendor_remaining = Some(remaining);
            if remaining == 0 {
                let wait = headers
                    .reset_after
                    .or(headers.retry_after)
                    .or_else(|| self.config.as_ref().map(|c| c.window))
                    .unwrap_or(Duration::from_secs(1));
                debug!(
                    integration = %self.name,
                    wait_ms = wait.as_millis(),
                    "Vendor rate limit exhausted"
                );
                state.blocked_until = now.checked_add(wait.min(MAX_VENDOR_DELAY));
            } else {
                state.blocked_until = None;
            }
        }

        if let Some(until) = headers
            .retry_after
            .and_then(|retry_after| now.checked_add(retry_after.min(MAX_VENDOR_DELAY)))
        {
            if state.blocked_until.map_or(true, |current| current < until) {
                state.blocked_until = Some(until);
            }
        }
    }

    /// Snapshot for reporting.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let now = Instant::now();
        let state = self.lock();
        let window_remaining_ms = self
            .config
            .as_ref()
            .map(|c| c.window.saturating_sub(now.duration_since(state.window_start)))
            .unwrap_or_default()
            .as_millis() as u64;

        RateLimitSnapshot {
            limit: self.config.as_ref().map(|c| c.max_requests),
            used: state.used,
            window_remaining_ms,
            vendor_remaining: state.vendor_remaining,
            vendor_blocked: state.blocked_until.is_some_and(|until| until > now),
        }
    }

    fn limited(&self, retry_after: Option<Duration>) -> IntegrationError {
        IntegrationError::RateLimited {
            integration: self.name.clone(),
            retry_after,
        }
    }
}
