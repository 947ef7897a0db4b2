//! Configuration structures
//!
//! Every field has a default so partial files and environment overrides
//! compose. Loading lives in `devicegate-infra`.

use std::fmt;
use std::time::Duration;

use devicegate_common::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub tasks: TaskSettings,
}

/// Remote API location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub api_version: String,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            api_version: "v1".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    /// `<url>/<api_version>` without duplicate slashes
    pub fn base_url(&self) -> String {
        let url = self.url.trim_end_matches('/');
        let version = self.api_version.trim_matches('/');
        if version.is_empty() {
            url.to_string()
        } else {
            format!("{url}/{version}")
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Static token bootstrap
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub bootstrap_token: Option<String>,
    pub token_expires_in_secs: Option<u64>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub refresh_buffer_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bootstrap_token: None,
            token_expires_in_secs: None,
            refresh_token: None,
            refresh_buffer_secs: 300,
        }
    }
}

impl AuthConfig {
    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bootstrap_token", &self.bootstrap_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_expires_in_secs", &self.token_expires_in_secs)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_buffer_secs", &self.refresh_buffer_secs)
            .finish()
    }
}

/// Retry policy for API calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1000, max_delay_ms: 30_000 }
    }
}

/// Per-endpoint circuit breaking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { enabled: true, failure_threshold: 5, reset_timeout_ms: 60_000 }
    }
}

/// Task tracking limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub max_concurrent_tasks: usize,
    pub default_timeout_ms: u64,
    pub cleanup_interval_ms: u64,
    pub retention_ms: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            default_timeout_ms: 3_600_000,
            cleanup_interval_ms: 300_000,
            retention_ms: 86_400_000,
        }
    }
}

impl TaskSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

impl Config {
    /// Reject configurations the runtime cannot work with
    pub fn validate(&self) -> GatewayResult<()> {
        if self.server.url.trim().is_empty() {
            return Err(GatewayError::config("server.url must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(GatewayError::config("retry.max_attempts must be at least 1"));
        }
        if self.tasks.max_concurrent_tasks == 0 {
            return Err(GatewayError::config("tasks.max_concurrent_tasks must be at least 1"));
        }
        if self.circuit_breaker.enabled && self.circuit_breaker.failure_threshold == 0 {
            return Err(GatewayError::config(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }
        if self.tasks.cleanup_interval_ms == 0 {
            return Err(GatewayError::config("tasks.cleanup_interval_ms must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use devicegate_common::error::ErrorCode;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.tasks.max_concurrent_tasks, 10);
        assert_eq!(config.tasks.default_timeout(), Duration::from_secs(3600));
        assert_eq!(config.auth.refresh_buffer(), Duration::from_secs(300));
        assert!(config.circuit_breaker.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_url_joins_cleanly() {
        let server = ServerConfig {
            url: "https://api.example.com/".into(),
            api_version: "/v2".into(),
            ..ServerConfig::default()
        };
        assert_eq!(server.base_url(), "https://api.example.com/v2");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.url = "  ".into();
        assert_eq!(config.validate().unwrap_err().code, ErrorCode::SystemConfig);

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tasks.max_concurrent_tasks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[server]\nurl = \"https://gw.local\"\n").unwrap();
        assert_eq!(config.server.url, "https://gw.local");
        assert_eq!(config.server.api_version, "v1");
        assert_eq!(config.retry, RetrySettings::default());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = Config::default();
        config.auth.bootstrap_token = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(!format!("{config:?}").contains("secret"));
    }
}
