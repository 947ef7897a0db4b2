//! Retry with exponential backoff and jitter
//!
//! Any error type implementing [`ErrorClassification`] can be retried; the
//! classification decides whether another attempt is worthwhile and may
//! supply a server-provided `retry_after` hint.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use crate::error::ErrorClassification;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single backoff delay
    pub max_delay: Duration,
    /// Maximum jitter added on top of the delay, as a fraction of it
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, ..Self::default() }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio;
        self
    }

    /// Un-jittered delay after the zero-based `attempt` failed:
    /// `min(base * 2^attempt, max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let max_jitter = delay.as_secs_f64() * self.jitter_ratio;
        let jitter = rand::thread_rng().gen_range(0.0..=max_jitter);
        delay + Duration::from_secs_f64(jitter)
    }
}

/// Result of a retried execution with summary statistics
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Invoke `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts. The last error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClassification + std::fmt::Display,
{
    retry_with_outcome(operation, config, context).await.result
}

/// Same as [`retry_with_backoff`] but reports attempts and accumulated delay
#[instrument(skip(operation, config), fields(max_attempts = config.max_attempts))]
pub async fn retry_with_outcome<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig,
    context: &str,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClassification + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut total_delay = Duration::ZERO;
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(context, attempts = attempt + 1, "Operation succeeded after retry");
                }
                return RetryOutcome { result: Ok(value), attempts: attempt + 1, total_delay };
            }
            Err(err) => {
                let is_last = attempt + 1 >= max_attempts;
                if is_last || !err.is_retryable() {
                    if is_last && err.is_retryable() {
                        warn!(
                            context,
                            attempts = attempt + 1,
                            error = %err,
                            "Retry attempts exhausted"
                        );
                    }
                    return RetryOutcome { result: Err(err), attempts: attempt + 1, total_delay };
                }

                let delay = match err.retry_after() {
                    Some(hint) => hint.min(config.max_delay),
                    None => config.jittered_delay(attempt),
                };
                warn!(
                    context,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Retryable failure, backing off"
                );

                tokio::time::sleep(delay).await;
                total_delay += delay;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::{ErrorCode, GatewayError};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(100)).with_jitter_ratio(0.0)
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_delay_schedule_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(64), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let delay = config.jittered_delay(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_millis(2200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_outcome(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(GatewayError::unavailable("down"))
                } else {
                    Ok("ok")
                }
            },
            &fast_config(3),
            "test",
        )
        .await;

        assert_eq!(outcome.result.unwrap(), "ok");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.total_delay, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GatewayError> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::invalid_token("nope"))
            },
            &fast_config(5),
            "test",
        )
        .await;

        assert_eq!(result.unwrap_err().code, ErrorCode::AuthInvalidToken);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GatewayError> = retry_with_backoff(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::timeout(format!("attempt {n}")))
            },
            &fast_config(3),
            "test",
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::NetworkTimeout);
        assert_eq!(err.message, "attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_capped() {
        let config = fast_config(2).with_max_delay(Duration::from_millis(500));
        let calls = AtomicU32::new(0);
        let outcome = retry_with_outcome(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(GatewayError::new(ErrorCode::NetworkRateLimited, "slow down")
                        .with_details(serde_json::json!({ "retry_after_secs": 10 })))
                } else {
                    Ok(())
                }
            },
            &config,
            "test",
        )
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.total_delay, Duration::from_millis(500));
    }
}
