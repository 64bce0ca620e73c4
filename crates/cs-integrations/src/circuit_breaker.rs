//! Three-state circuit breaker.
//!
//! Counts consecutive outage-type failures for one integration. Once the
//! count reaches the threshold the breaker opens and every call is rejected
//! locally until `reset_timeout` has passed; then a single trial request is
//! let through (half-open). A successful trial closes the breaker, a failed
//! one re-opens it.
//!
//! Admission hands out a [`CircuitPermit`]. A permit dropped without an
//! outcome (the request future was cancelled, or it never went out) gives
//! the half-open trial slot back.
//!
//! # Example
//!
//! ```rust
//! use cs_integrations::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new("gainsight", CircuitBreakerConfig::default());
//! let permit = breaker.allow_request().unwrap();
//! permit.success();
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! # }
//! ```

use crate::error::{IntegrationError, IntegrationResult};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected without touching the network.
    Open,
    /// One trial request is allowed to test recovery.
    HalfOpen,
}

impl CircuitState {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// How long the breaker stays open before probing.
    pub reset_timeout: Duration,

    /// Successful trial requests needed to close from half-open.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

/// Point-in-time view of a breaker, for status tools and health reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,

    /// Consecutive failures counted so far.
    pub consecutive_failures: u32,

    /// How many times the breaker has opened.
    pub trips: u64,

    /// Milliseconds until an open breaker will allow a trial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    trips: u64,
}

/// Circuit breaker guarding one integration.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
                trial_in_flight: false,
                trips: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask permission to send a request.
    ///
    /// Returns `CircuitOpen` while the breaker is open, or while a half-open
    /// trial is already in flight. The returned permit should be settled
    /// with [`CircuitPermit::success`] or [`CircuitPermit::failure`].
    pub fn allow_request(&self) -> IntegrationResult<CircuitPermit<'_>> {
        let mut inner = self.lock();

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(self.config.reset_timeout);

                if elapsed < self.config.reset_timeout {
                    return Err(self.open_error());
                }
                info!(integration = %self.name, "Circuit half-open, sending trial request");
                inner.state = CircuitState::HalfOpen;
                inner.half_open_successes = 0;
                inner.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.open_error());
                }
                inner.trial_in_flight = true;
                true
            }
        };

        Ok(CircuitPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Record a completed round-trip.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                info!(integration = %self.name, "Circuit closed after successful trial");
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.half_open_successes = 0;
            }
        }
    }

    /// Record an outage-type failure.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut inner);
                }
            }
            CircuitState::HalfOpen => self.trip(&mut inner),
            CircuitState::Open => {}
        }
    }

    /// Give back a half-open trial slot without recording an outcome.
    pub fn release(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        warn!(
            integration = %self.name,
            failures = inner.consecutive_failures,
            reset_timeout_secs = self.config.reset_timeout.as_secs(),
            "Circuit opened"
        );
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
        inner.half_open_successes = 0;
        inner.trips += 1;
    }

    fn open_error(&self) -> IntegrationError {
        IntegrationError::CircuitOpen {
            integration: self.name.clone(),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Snapshot for reporting.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        let retry_in_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => Some(
                self.config
                    .reset_timeout
                    .saturating_sub(opened_at.elapsed())
                    .as_millis() as u64,
            ),
            _ => None,
        };

        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            trips: inner.trips,
            retry_in_ms,
        }
    }

    /// Force the breaker closed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    /// Breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Admission ticket from [`CircuitBreaker::allow_request`].
///
/// Dropping an unsettled permit that holds the half-open trial slot
/// releases the slot, so a cancelled trial never leaves the breaker stuck.
#[derive(Debug)]
#[must_use = "settle the permit with success() or failure()"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    /// Whether this permit holds the half-open trial slot.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The request completed; record a success.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    /// The request failed in a way that counts towards opening the breaker.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            debug!(integration = %self.breaker.name, "Trial request abandoned, releasing slot");
            self.breaker.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let breaker = breaker(3);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!breaker.allow_request().unwrap().is_trial());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.allow_request().unwrap_err();
        assert!(matches!(err, IntegrationError::CircuitOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(3);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_single_trial() {
        let breaker = breaker(1);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        let trial = breaker.allow_request().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Second caller is rejected while the trial is outstanding
        assert!(breaker.allow_request().is_err());

        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let breaker = breaker(1);
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(31)).await;
        breaker.allow_request().unwrap().failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().trips, 2);
        assert!(breaker.allow_request().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_slot() {
        let breaker = breaker(1);
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(31)).await;
        let trial = breaker.allow_request().unwrap();
        assert!(breaker.allow_request().is_err());

        drop(trial);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.allow_request().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_permit_drop_keeps_trial() {
        let breaker = breaker(1);
        let stale = breaker.allow_request().unwrap();
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(31)).await;
        let _trial = breaker.allow_request().unwrap();

        // A permit from before the trip must not free the current trial
        drop(stale);
        assert!(breaker.allow_request().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_retry_window() {
        let breaker = breaker(1);
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(10)).await;
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.retry_in_ms, Some(20_000));

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
