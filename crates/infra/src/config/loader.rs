//! Configuration loader
//!
//! Loads application configuration from environment variables and files.
//!
//! ## Loading Strategy
//! 1. Start from the first config file found by [`probe_config_paths`], or
//!    from defaults when there is none
//! 2. Overlay every `DEVICEGATE_*` environment variable that is set
//! 3. Validate the result
//!
//! ## Environment Variables
//! - `DEVICEGATE_SERVER_URL`: Remote API root (required by [`load_from_env`])
//! - `DEVICEGATE_API_VERSION`: Path segment appended to the URL
//! - `DEVICEGATE_API_TOKEN`: Bootstrap token
//! - `DEVICEGATE_REFRESH_TOKEN`: Refresh token for the bootstrap token
//! - `DEVICEGATE_TOKEN_EXPIRES_IN`: Bootstrap token lifetime in seconds
//! - `DEVICEGATE_REQUEST_TIMEOUT_MS`: Per-request timeout
//! - `DEVICEGATE_RETRY_ATTEMPTS`: Attempts per request
//! - `DEVICEGATE_RETRY_DELAY_MS`: Base backoff delay
//! - `DEVICEGATE_CIRCUIT_BREAKER_ENABLED`: Whether breakers are used
//! - `DEVICEGATE_MAX_CONCURRENT_TASKS`: Task tracker capacity
//! - `DEVICEGATE_TASK_TIMEOUT_MS`: Default task timeout
//! - `DEVICEGATE_CLEANUP_INTERVAL_MS`: Task sweep period
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./devicegate.toml` or `./devicegate.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use devicegate_domain::{Config, GatewayError, GatewayResult};
use tracing::{debug, info};

const FILE_NAMES: [&str; 4] = ["devicegate.toml", "devicegate.json", "config.toml", "config.json"];

/// Load configuration with file and environment layering
///
/// # Errors
/// Returns `SYSTEM_CONFIG` if:
/// - A config file exists but cannot be read or parsed
/// - An environment variable has an invalid value
/// - The merged configuration fails validation
pub fn load() -> GatewayResult<Config> {
    let mut config = match probe_config_paths() {
        Some(path) => read_file(&path)?,
        None => {
            debug!("No config file found, starting from defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    info!(base_url = %config.server.base_url(), "Configuration loaded");
    Ok(config)
}

/// Load configuration from environment variables only
///
/// `DEVICEGATE_SERVER_URL` must be present; every other field falls back
/// to its default.
///
/// # Errors
/// Returns `SYSTEM_CONFIG` if the URL is missing or a value is invalid.
pub fn load_from_env() -> GatewayResult<Config> {
    env_var("DEVICEGATE_SERVER_URL")?;

    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Supports both JSON
/// and TOML (detected by file extension). Environment variables are not
/// consulted.
///
/// # Errors
/// Returns `SYSTEM_CONFIG` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> GatewayResult<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(GatewayError::config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            GatewayError::config("No config file found in any of the standard locations")
        })?,
    };

    let config = read_file(&config_path)?;
    config.validate()?;
    Ok(config)
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn read_file(path: &Path) -> GatewayResult<Config> {
    info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> GatewayResult<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| GatewayError::config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| GatewayError::config(format!("Invalid JSON format: {e}"))),
        _ => Err(GatewayError::config(format!("Unsupported config format: {extension}"))),
    }
}

/// Overlay every `DEVICEGATE_*` variable that is set
fn apply_env_overrides(config: &mut Config) -> GatewayResult<()> {
    if let Some(url) = env_opt("DEVICEGATE_SERVER_URL") {
        config.server.url = url;
    }
    if let Some(version) = env_opt("DEVICEGATE_API_VERSION") {
        config.server.api_version = version;
    }
    if let Some(token) = env_opt("DEVICEGATE_API_TOKEN") {
        config.auth.bootstrap_token = Some(token);
    }
    if let Some(refresh) = env_opt("DEVICEGATE_REFRESH_TOKEN") {
        config.auth.refresh_token = Some(refresh);
    }
    if let Some(secs) = env_parse("DEVICEGATE_TOKEN_EXPIRES_IN")? {
        config.auth.token_expires_in_secs = Some(secs);
    }
    if let Some(ms) = env_parse("DEVICEGATE_REQUEST_TIMEOUT_MS")? {
        config.server.request_timeout_ms = ms;
    }
    if let Some(attempts) = env_parse("DEVICEGATE_RETRY_ATTEMPTS")? {
        config.retry.max_attempts = attempts;
    }
    if let Some(ms) = env_parse("DEVICEGATE_RETRY_DELAY_MS")? {
        config.retry.base_delay_ms = ms;
    }
    config.circuit_breaker.enabled =
        env_bool("DEVICEGATE_CIRCUIT_BREAKER_ENABLED", config.circuit_breaker.enabled);
    if let Some(max) = env_parse("DEVICEGATE_MAX_CONCURRENT_TASKS")? {
        config.tasks.max_concurrent_tasks = max;
    }
    if let Some(ms) = env_parse("DEVICEGATE_TASK_TIMEOUT_MS")? {
        config.tasks.default_timeout_ms = ms;
    }
    if let Some(ms) = env_parse("DEVICEGATE_CLEANUP_INTERVAL_MS")? {
        config.tasks.cleanup_interval_ms = ms;
    }
    Ok(())
}

/// Get required environment variable
///
/// # Errors
/// Returns `SYSTEM_CONFIG` if the variable is not set.
fn env_var(key: &str) -> GatewayResult<String> {
    std::env::var(key)
        .map_err(|_| GatewayError::config(format!("Missing required environment variable: {key}")))
}

/// Non-empty environment variable, if set
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse a numeric environment variable, if set
fn env_parse<T>(key: &str) -> GatewayResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| GatewayError::config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
