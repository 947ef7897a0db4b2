//! Error taxonomy shared by every DeviceGate crate
//!
//! All failures that leave a component are expressed as one [`GatewayError`]
//! carrying an [`ErrorCode`]. Codes fall into four families:
//!
//! | Family | Codes | Raised by |
//! |--------|-------|-----------|
//! | `AUTH_*` | missing, expired, invalid token | token manager, API client |
//! | `NETWORK_*` | timeout, rate limited, server error, connection failed, unavailable | API client, circuit breaker |
//! | `TASK_*` | already running, limit exceeded, not found, invalid transition | task manager |
//! | `SYSTEM_*` | internal, maintenance mode, config | everything else |
//!
//! ## ErrorClassification
//!
//! The resilience layer never matches on concrete error types. It asks the
//! [`ErrorClassification`] trait whether a failure is worth retrying, so any
//! error type (including test doubles) can be driven through
//! `retry_with_backoff`.
//!
//! ```rust
//! use devicegate_common::error::{ErrorClassification, ErrorCode, GatewayError};
//!
//! let err = GatewayError::new(ErrorCode::NetworkRateLimited, "slow down");
//! assert!(err.is_retryable());
//!
//! let err = GatewayError::new(ErrorCode::AuthInvalidToken, "rejected");
//! assert!(!err.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Standard result type using [`GatewayError`]
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No token has been configured, or a refresh was requested without a
    /// refresh token
    AuthMissingToken,
    /// The current token has expired
    AuthTokenExpired,
    /// The remote API rejected the token
    AuthInvalidToken,

    /// The request did not complete in time
    NetworkTimeout,
    /// The remote API is throttling us (HTTP 429)
    NetworkRateLimited,
    /// The remote API failed with a 5xx status
    NetworkServerError,
    /// The remote host could not be reached
    NetworkConnectionFailed,
    /// The remote API is unavailable (HTTP 503 or an open circuit)
    NetworkUnavailable,

    /// A task with the same id is already tracked
    TaskAlreadyRunning,
    /// Too many tasks are tracked at once
    TaskLimitExceeded,
    /// No task with the given id
    TaskNotFound,
    /// The requested status change is not a legal transition
    TaskInvalidTransition,

    /// Unexpected failure inside DeviceGate
    SystemInternal,
    /// The remote API reported planned maintenance
    SystemMaintenanceMode,
    /// Invalid or missing configuration
    SystemConfig,
}

/// Family an [`ErrorCode`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    Auth,
    Network,
    Task,
    System,
}

impl ErrorCode {
    /// Stable string form, identical to the serialized representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthMissingToken => "AUTH_MISSING_TOKEN",
            Self::AuthTokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::AuthInvalidToken => "AUTH_INVALID_TOKEN",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::NetworkRateLimited => "NETWORK_RATE_LIMITED",
            Self::NetworkServerError => "NETWORK_SERVER_ERROR",
            Self::NetworkConnectionFailed => "NETWORK_CONNECTION_FAILED",
            Self::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            Self::TaskAlreadyRunning => "TASK_ALREADY_RUNNING",
            Self::TaskLimitExceeded => "TASK_LIMIT_EXCEEDED",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::TaskInvalidTransition => "TASK_INVALID_TRANSITION",
            Self::SystemInternal => "SYSTEM_INTERNAL",
            Self::SystemMaintenanceMode => "SYSTEM_MAINTENANCE_MODE",
            Self::SystemConfig => "SYSTEM_CONFIG",
        }
    }

    pub fn family(&self) -> ErrorFamily {
        match self {
            Self::AuthMissingToken | Self::AuthTokenExpired | Self::AuthInvalidToken => {
                ErrorFamily::Auth
            }
            Self::NetworkTimeout
            | Self::NetworkRateLimited
            | Self::NetworkServerError
            | Self::NetworkConnectionFailed
            | Self::NetworkUnavailable => ErrorFamily::Network,
            Self::TaskAlreadyRunning
            | Self::TaskLimitExceeded
            | Self::TaskNotFound
            | Self::TaskInvalidTransition => ErrorFamily::Task,
            Self::SystemInternal | Self::SystemMaintenanceMode | Self::SystemConfig => {
                ErrorFamily::System
            }
        }
    }

    /// Whether a failure with this code may succeed if the call is repeated
    ///
    /// Connection failures are deliberately excluded: a refused connection
    /// is reported on the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout
                | Self::NetworkRateLimited
                | Self::NetworkServerError
                | Self::NetworkUnavailable
                | Self::SystemMaintenanceMode
        )
    }

    /// Map an HTTP status to the code used when the response is unusable
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::AuthInvalidToken,
            408 => Self::NetworkTimeout,
            429 => Self::NetworkRateLimited,
            503 => Self::NetworkUnavailable,
            500..=599 => Self::NetworkServerError,
            _ => Self::SystemInternal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity levels used for log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected conditions (e.g. unknown task id)
    Info,
    /// Degraded but operational (throttling, transient outages)
    Warning,
    /// Failure requiring attention
    Error,
    /// Invariant violated
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Standard interface for classifying errors
pub trait ErrorClassification {
    /// Check if this error is retryable
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// The single error type surfaced by DeviceGate components
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct GatewayError {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional structured context (status, body, endpoint, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// When the error was created
    pub timestamp: DateTime<Utc>,
}

impl GatewayError {
    /// Create an error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None, timestamp: Utc::now() }
    }

    /// Attach structured details (fluent API)
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn missing_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthMissingToken, message)
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorCode::AuthTokenExpired, "Authentication token has expired")
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalidToken, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkTimeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkUnavailable, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkConnectionFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SystemInternal, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SystemConfig, message)
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(ErrorCode::TaskNotFound, format!("Task '{task_id}' not found"))
    }

    /// Shorthand for `self.code == code`
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl ErrorClassification for GatewayError {
    fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    fn severity(&self) -> ErrorSeverity {
        match self.code.family() {
            ErrorFamily::Task => ErrorSeverity::Info,
            ErrorFamily::Network => ErrorSeverity::Warning,
            ErrorFamily::Auth => ErrorSeverity::Error,
            ErrorFamily::System => match self.code {
                ErrorCode::SystemMaintenanceMode => ErrorSeverity::Warning,
                _ => ErrorSeverity::Critical,
            },
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.details
            .as_ref()
            .and_then(|d| d.get("retry_after_secs"))
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {err}"))
    }
}
