//! Resilience patterns: retry with backoff and circuit breaking
//!
//! Both are generic over the operation's error type. Retry decisions go
//! through [`ErrorClassification`](crate::error::ErrorClassification); the
//! breaker takes its notion of "now" from a [`Clock`](crate::time::Clock).

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    create_circuit_breaker, create_circuit_breaker_with_clock, CircuitBreaker,
    CircuitBreakerConfig, CircuitBreakerState, CircuitState, ConfigError, ConfigResult,
    ProtectedCall, ResilienceError, ResilienceResult,
};
pub use retry::{retry_with_backoff, retry_with_outcome, RetryConfig, RetryOutcome};
