//! Retry utilities with exponential backoff.
//!
//! Vendor APIs fail transiently (timeouts, 5xx, throttling). The helpers in
//! this module re-run an async operation with exponential backoff; the
//! policy-aware variant also honours `Retry-After` style hints carried by
//! the error.
//!
//! # Example
//!
//! ```rust,no_run
//! use cs_integrations::retry::{with_retry, RetryConfig};
//! use std::time::Duration;
//!
//! async fn example() -> Result<String, std::io::Error> {
//!     let config = RetryConfig {
//!         max_attempts: 3,
//!         initial_delay: Duration::from_millis(100),
//!         max_delay: Duration::from_secs(10),
//!         exponential_base: 2.0,
//!     };
//!
//!     with_retry(&config, || async { Ok("success".to_string()) }).await
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Base for exponential backoff (typically 2.0)
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Short delays, for cheap idempotent reads.
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
        }
    }

    /// Balanced configuration for most vendor calls.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Longer delays for bulk exports and slow vendors.
    pub fn slow() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
        }
    }

    /// Never retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
        }
    }

    /// Same backoff shape with a different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(
            (current.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Errors that know whether they are worth retrying.
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the remote side.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for crate::error::IntegrationError {
    fn is_retryable(&self) -> bool {
        crate::error::IntegrationError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        crate::error::IntegrationError::retry_after(self)
    }
}

/// Execute a function with retries.
///
/// Every error is treated as retryable; the last error is returned once
/// `max_attempts` is reached.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    retry_loop(config, f, |_| true, |_| None).await
}

/// Execute a function with retries, stopping early on non-retryable errors.
///
/// # Example
///
/// ```rust,no_run
/// use cs_integrations::retry::{with_retry_if, RetryConfig};
///
/// #[derive(Debug)]
/// enum MyError {
///     Transient,
///     Permanent,
/// }
///
/// async fn example() -> Result<(), MyError> {
///     with_retry_if(
///         &RetryConfig::default(),
///         || async { Err(MyError::Transient) },
///         |err| matches!(err, MyError::Transient),
///     )
///     .await
/// }
/// ```
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    f: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: FnMut(&E) -> bool,
{
    retry_loop(config, f, is_retryable, |_| None).await
}

/// Execute a function with retries driven by the error's own policy.
///
/// A `retry_after` hint stretches the next delay (never beyond
/// `max_delay`).
pub async fn with_retry_policy<F, Fut, T, E>(config: &RetryConfig, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug + Retryable,
{
    retry_loop(config, f, |e: &E| e.is_retryable(), |e: &E| e.retry_after()).await
}

async fn retry_loop<F, Fut, T, E, P, H>(
    config: &RetryConfig,
    mut f: F,
    mut is_retryable: P,
    mut hint: H,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: FnMut(&E) -> bool,
    H: FnMut(&E) -> Option<Duration>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) => {
                tracing::debug!(error = ?e, "Error is not retryable, returning immediately");
                return Err(e);
            }
            Err(e) if attempt >= config.max_attempts => {
                tracing::error!(attempts = attempt, error = ?e, "All retry attempts exhausted");
                return Err(e);
            }
            Err(e) => {
                let wait = hint(&e)
                    .map(|h| h.max(delay).min(config.max_delay))
                    .unwrap_or(delay);

                tracing::warn!(
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis(),
                    error = ?e,
                    "Attempt failed, retrying"
                );

                sleep(wait).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Throttled(Option<Duration>);

    impl Retryable for Throttled {
        fn is_retryable(&self) -> bool {
            true
        }

        fn retry_after(&self) -> Option<Duration> {
            self.0
        }
    }

    #[test]
    fn test_retry_config_presets() {
        assert_eq!(RetryConfig::fast().initial_delay, Duration::from_millis(50));
        assert_eq!(RetryConfig::slow().max_attempts, 5);
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
        assert_eq!(RetryConfig::standard().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_next_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(6),
            exponential_base: 2.0,
        };
        assert_eq!(config.next_delay(Duration::from_secs(4)), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&RetryConfig::fast(), || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let config = RetryConfig::fast().with_max_attempts(2);

        let result = with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("always fails")
            }
        })
        .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_if_non_retryable_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry_if(
            &RetryConfig::fast(),
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("permanent failure")
                }
            },
            |_| false,
        )
        .await;

        assert_eq!(result, Err("permanent failure"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_policy_honours_hint() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(5),
            exponential_base: 2.0,
        };
        let start = tokio::time::Instant::now();

        let result = with_retry_policy(&config, || async {
            Err::<(), _>(Throttled(Some(Duration::from_secs(3))))
        })
        .await;

        assert_eq!(result, Err(Throttled(Some(Duration::from_secs(3)))));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
