//! HTTP status classification for the API client
//!
//! Decides whether a non-2xx response is raised as a [`GatewayError`] or
//! handed to the response normalizer.

use devicegate_common::error::{ErrorCode, GatewayError};
use serde_json::json;

/// Longest body excerpt copied into error details
const BODY_EXCERPT_LEN: usize = 512;

/// Categories of HTTP statuses as seen by the request pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// 2xx
    Success,
    /// 401 - refresh once and replay, then raise
    Authentication,
    /// 408, 429, 5xx - always raised so the retry layer can act
    Retryable,
    /// Any other status - normalized when the body is JSON, raised otherwise
    Client,
}

impl StatusCategory {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            401 => Self::Authentication,
            408 | 429 | 500..=599 => Self::Retryable,
            _ => Self::Client,
        }
    }

    /// Whether a response in this category must become an error
    /// regardless of its body
    pub fn always_raises(self) -> bool {
        matches!(self, Self::Authentication | Self::Retryable)
    }
}

/// Build the error for an unusable response
///
/// A 503 whose body mentions maintenance is reported as
/// `SYSTEM_MAINTENANCE_MODE`. `retry_after_secs` is copied from the
/// `Retry-After` header when the server sent one.
pub fn status_error(
    status: u16,
    endpoint: &str,
    body: &str,
    retry_after_secs: Option<u64>,
) -> GatewayError {
    let code = if status == 503 && body.to_ascii_lowercase().contains("maintenance") {
        ErrorCode::SystemMaintenanceMode
    } else {
        ErrorCode::from_status(status)
    };

    let message = match code {
        ErrorCode::AuthInvalidToken => "Authentication rejected by the remote API".to_string(),
        ErrorCode::NetworkTimeout => "Remote API timed out".to_string(),
        ErrorCode::NetworkRateLimited => "Rate limited by the remote API".to_string(),
        ErrorCode::NetworkUnavailable => "Remote API unavailable".to_string(),
        ErrorCode::SystemMaintenanceMode => "Remote API is in maintenance mode".to_string(),
        ErrorCode::NetworkServerError => format!("Remote API server error (HTTP {status})"),
        _ => format!("Request failed with HTTP {status}"),
    };

    let mut details = json!({
        "status": status,
        "endpoint": endpoint,
    });
    if !body.is_empty() {
        let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
        details["body"] = json!(excerpt);
    }
    if let Some(secs) = retry_after_secs {
        details["retry_after_secs"] = json!(secs);
    }

    GatewayError::new(code, message).with_details(details)
}
