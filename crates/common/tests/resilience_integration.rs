//! Integration tests for the resilience module
//!
//! Exercises retry and circuit breaking together with a custom error type,
//! using Tokio paused time and `MockClock` instead of real sleeps.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use devicegate_common::error::{ErrorClassification, ErrorCode, GatewayError};
use devicegate_common::resilience::{
    create_circuit_breaker_with_clock, retry_with_backoff, retry_with_outcome, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, ResilienceError, RetryConfig,
};
use devicegate_common::time::MockClock;
use tokio_test::assert_err;

/// Custom error type for testing
#[derive(Debug, Clone)]
struct TestError {
    message: String,
    retryable: bool,
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

impl ErrorClassification for TestError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

fn transient(message: &str) -> TestError {
    TestError { message: message.to_string(), retryable: true }
}

/// Validates that retries back off with non-decreasing delays and stop once
/// the operation succeeds.
///
/// # Test Steps
/// 1. Fail twice with a retryable error, then succeed
/// 2. Record the virtual time at which every attempt starts
/// 3. Assert three attempts happened and the gaps never shrink
#[tokio::test(start_paused = true)]
async fn test_retry_recovers_with_growing_delays() {
    let start = tokio::time::Instant::now();
    let attempt_times = Arc::new(parking_lot::Mutex::new(Vec::<Duration>::new()));
    let calls = AtomicU32::new(0);

    let config = RetryConfig::new(3, Duration::from_millis(100));
    let result = retry_with_backoff(
        || {
            let times = Arc::clone(&attempt_times);
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                times.lock().push(start.elapsed());
                if n < 2 {
                    Err(transient("flaky"))
                } else {
                    Ok(n)
                }
            }
        },
        &config,
        "integration",
    )
    .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let times = attempt_times.lock().clone();
    assert_eq!(times.len(), 3);
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_millis(100));
    assert!(second_gap >= first_gap);
}

/// Validates that a non-retryable error short-circuits the retry loop.
#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_is_invoked_once() {
    let calls = AtomicU32::new(0);
    let outcome = retry_with_outcome(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError { message: "bad request".into(), retryable: false })
        },
        &RetryConfig::default(),
        "integration",
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.total_delay, Duration::ZERO);
    assert_eq!(outcome.result.unwrap_err().message, "bad request");
}

/// Validates the full breaker cycle with threshold 2 and a 50ms reset.
///
/// # Test Steps
/// 1. Two failures open the circuit
/// 2. A third call within the cooldown is rejected without invoking the op
/// 3. After advancing the clock past the cooldown, a success closes it
#[tokio::test]
async fn test_circuit_breaker_full_cycle() {
    let clock = MockClock::new();
    let calls = Arc::new(AtomicU32::new(0));
    let should_fail = Arc::new(std::sync::atomic::AtomicBool::new(true));

    let protected = {
        let calls = Arc::clone(&calls);
        let should_fail = Arc::clone(&should_fail);
        create_circuit_breaker_with_clock(
            move || {
                let calls = Arc::clone(&calls);
                let should_fail = should_fail.load(Ordering::SeqCst);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if should_fail {
                        Err(transient("down"))
                    } else {
                        Ok("up")
                    }
                }
            },
            CircuitBreakerConfig::new(2, Duration::from_millis(50)),
            clock.clone(),
        )
        .unwrap()
    };

    assert_err!(protected.call().await);
    assert_err!(protected.call().await);
    assert_eq!(protected.breaker().state(), CircuitState::Open);

    let rejected = protected.call().await;
    assert!(matches!(rejected, Err(ResilienceError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    clock.advance_millis(51);
    should_fail.store(false, Ordering::SeqCst);
    assert_eq!(protected.call().await.unwrap(), "up");
    assert_eq!(protected.breaker().state(), CircuitState::Closed);
    assert_eq!(protected.breaker().snapshot().failure_count, 0);
}

/// Validates retry wrapped around a breaker: once the breaker opens, the
/// rejection surfaces as `NETWORK_UNAVAILABLE` and is itself retryable.
#[tokio::test(start_paused = true)]
async fn test_retry_around_open_breaker_reports_unavailable() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::new(1, Duration::from_secs(60));
    let breaker = CircuitBreaker::with_clock("svc", config, clock).unwrap();
    let calls = AtomicU32::new(0);

    let result: Result<(), GatewayError> = retry_with_backoff(
        || async {
            breaker
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::new(ErrorCode::NetworkServerError, "500"))
                })
                .await
                .map_err(GatewayError::from)
        },
        &RetryConfig::new(3, Duration::from_millis(10)),
        "integration",
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::NetworkUnavailable);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
