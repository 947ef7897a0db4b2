//! Circuit breaker
//!
//! Stops invoking a failing dependency for a cooldown period after repeated
//! failures. Every breaker owns its own [`CircuitBreakerState`]; clones share
//! it.
//!
//! ```text
//!            failure_count >= threshold
//!   CLOSED ─────────────────────────────► OPEN
//!     ▲                                    │ now - last_failure > reset_timeout
//!     │ trial succeeds                     ▼
//!     └────────────────────────────── HALF_OPEN
//!                 trial fails ──► OPEN
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, GatewayError};
use crate::time::{Clock, SystemClock};

//==============================================================================
// Error Types
//==============================================================================

/// Simple configuration error for validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced by a circuit-protected call
///
/// Generic over the underlying operation error type `E` so the original
/// failure is preserved.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen { retry_after: Option<Duration> },

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

/// Result type for circuit-protected operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

impl From<ResilienceError<GatewayError>> for GatewayError {
    fn from(err: ResilienceError<GatewayError>) -> Self {
        match err {
            ResilienceError::CircuitOpen { retry_after } => {
                let mut error = GatewayError::new(
                    ErrorCode::NetworkUnavailable,
                    "Service unavailable: circuit breaker is open",
                );
                if let Some(wait) = retry_after {
                    error = error
                        .with_details(serde_json::json!({ "retry_after_secs": wait.as_secs() }));
                }
                error
            }
            ResilienceError::OperationFailed { source } => source,
        }
    }
}

//==============================================================================
// State
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// One trial call is allowed through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Snapshot of a breaker's mutable state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self { state: CircuitState::Closed, failure_count: 0, last_failure_time: None }
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: CircuitBreakerState,
    trial_in_flight: bool,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait after the last failure before probing again
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self { failure_threshold, reset_timeout }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

//==============================================================================
// Breaker
//==============================================================================

/// Generic circuit breaker
///
/// Wraps any asynchronous operation; the breaker itself knows nothing about
/// HTTP or endpoints.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        Self::with_shared_clock(name, config, Arc::new(clock))
    }

    /// Create a circuit breaker sharing an existing clock
    pub fn with_shared_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<C>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let name: String = name.into();
        Ok(Self {
            name: Arc::from(name.as_str()),
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decide whether a call may proceed, transitioning OPEN → HALF_OPEN when
    /// the cooldown has elapsed
    ///
    /// `Ok(true)` marks the caller as the single half-open trial call.
    fn try_acquire(&self) -> Result<bool, Option<Duration>> {
        let mut inner = self.inner.lock();
        match inner.snapshot.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let now = self.clock.now();
                let since_failure = inner
                    .snapshot
                    .last_failure_time
                    .map_or(Duration::MAX, |t| now.saturating_duration_since(t));

                if since_failure > self.config.reset_timeout {
                    inner.snapshot.state = CircuitState::HalfOpen;
                    inner.snapshot.failure_count = 0;
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "Circuit breaker half-open, probing");
                    Ok(true)
                } else {
                    Err(Some(self.config.reset_timeout.saturating_sub(since_failure)))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(None)
                } else {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    /// Execute an operation with circuit breaker protection
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let is_trial = match self.try_acquire() {
            Ok(is_trial) => is_trial,
            Err(retry_after) => {
                debug!(
                    breaker = %self.name,
                    state = %self.state(),
                    "Circuit breaker rejecting call"
                );
                return Err(ResilienceError::CircuitOpen { retry_after });
            }
        };

        let mut guard = TrialGuard { breaker: self, armed: is_trial };
        let result = operation().await;
        guard.armed = false;

        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(source) => {
                self.record_failure();
                Err(ResilienceError::OperationFailed { source })
            }
        }
    }

    /// The half-open trial call was dropped before it finished
    ///
    /// Counts as a failed trial call: the circuit reopens and the cooldown restarts.
    fn abandon_trial(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if !inner.trial_in_flight || inner.snapshot.state != CircuitState::HalfOpen {
            return;
        }
        inner.trial_in_flight = false;
        inner.snapshot.state = CircuitState::Open;
        inner.snapshot.last_failure_time = Some(now);
        warn!(breaker = %self.name, "Circuit breaker re-opened after abandoned trial call");
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
        if inner.snapshot.state == CircuitState::HalfOpen {
            info!(breaker = %self.name, "Circuit breaker closed after successful trial call");
        }
        inner.snapshot.state = CircuitState::Closed;
        inner.snapshot.failure_count = 0;
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
        inner.snapshot.failure_count = inner.snapshot.failure_count.saturating_add(1);
        inner.snapshot.last_failure_time = Some(now);

        match inner.snapshot.state {
            CircuitState::Closed => {
                if inner.snapshot.failure_count >= self.config.failure_threshold {
                    inner.snapshot.state = CircuitState::Open;
                    warn!(
                        breaker = %self.name,
                        failures = inner.snapshot.failure_count,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.snapshot.state = CircuitState::Open;
                warn!(breaker = %self.name, "Circuit breaker re-opened after failed trial call");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state without triggering the OPEN → HALF_OPEN transition
    pub fn state(&self) -> CircuitState {
        self.inner.lock().snapshot.state
    }

    /// Copy of the breaker's bookkeeping
    pub fn snapshot(&self) -> CircuitBreakerState {
        self.inner.lock().snapshot.clone()
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        *self.inner.lock() = Inner::default();
        info!(breaker = %self.name, "Circuit breaker manually reset");
    }
}

/// Settles the half-open trial call whose future is dropped mid-flight
struct TrialGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    armed: bool,
}

impl<C: Clock> Drop for TrialGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}

//==============================================================================
// Wrapped operations
//==============================================================================

/// An operation bundled with its own circuit breaker
pub struct ProtectedCall<F, C: Clock = SystemClock> {
    operation: F,
    breaker: CircuitBreaker<C>,
}

impl<F, C: Clock> ProtectedCall<F, C> {
    /// Invoke the wrapped operation through the breaker
    pub async fn call<Fut, T, E>(&self) -> ResilienceResult<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.breaker.execute(|| (self.operation)()).await
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }
}

/// Wrap `operation` in a fresh circuit breaker
pub fn create_circuit_breaker<F>(
    operation: F,
    config: CircuitBreakerConfig,
) -> ConfigResult<ProtectedCall<F>> {
    create_circuit_breaker_with_clock(operation, config, SystemClock)
}

/// [`create_circuit_breaker`] with an explicit clock
pub fn create_circuit_breaker_with_clock<F, C: Clock>(
    operation: F,
    config: CircuitBreakerConfig,
    clock: C,
) -> ConfigResult<ProtectedCall<F, C>> {
    let breaker = CircuitBreaker::with_clock("wrapped", config, clock)?;
    Ok(ProtectedCall { operation, breaker })
}
