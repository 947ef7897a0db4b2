//! Shared building blocks for DeviceGate crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: the error taxonomy (`ErrorCode`, `GatewayError`,
//!   `ErrorClassification`)
//! - `runtime`: async infrastructure (clock, timers, retry, circuit breaker)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod time;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{
    ErrorClassification, ErrorCode, ErrorFamily, ErrorSeverity, GatewayError, GatewayResult,
};
#[cfg(feature = "runtime")]
pub use resilience::{
    create_circuit_breaker, retry_with_backoff, CircuitBreaker, CircuitBreakerConfig,
    CircuitState, ResilienceError, RetryConfig,
};
#[cfg(feature = "runtime")]
pub use time::{Clock, MockClock, SystemClock, TimerHandle};
