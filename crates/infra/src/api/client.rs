//! API client with circuit breaker and retry logic
//!
//! Every call goes through the same pipeline:
//!
//! 1. `Authorization: Custom <token>` from the token provider (unless
//!    [`RequestOptions::skip_auth`])
//! 2. a circuit breaker keyed by `"<METHOD> <path>"`
//! 3. one HTTP exchange; a 401 triggers a single token refresh and replay
//! 4. response normalization into [`ApiResponse`]
//!
//! Steps 1-4 are wrapped in `retry_with_backoff` unless
//! [`RequestOptions::skip_retry`] is set. A breaker rejection ends the
//! request at once with the last real failure it saw, if any.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use devicegate_common::error::{ErrorClassification, GatewayError, GatewayResult};
use devicegate_common::resilience::{
    retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilienceError,
    RetryConfig,
};
use devicegate_common::time::{Clock, SystemClock};
use devicegate_domain::{ApiResponse, Config};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::auth::AccessTokenProvider;
use super::errors::{status_error, StatusCategory};
use super::response::normalize;
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Probe target for [`ApiClient::test_connection`]
const HEALTH_PATH: &str = "/health";

/// Configuration for API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Versioned base URL, e.g. `http://localhost:8080/v1`
    pub base_url: String,
    /// Default timeout for one HTTP exchange
    pub timeout: Duration,
    /// Retry policy for retryable failures
    pub retry: RetryConfig,
    /// Per-endpoint breaker settings; `None` disables circuit breaking
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

impl From<&Config> for ApiClientConfig {
    fn from(config: &Config) -> Self {
        let retry = RetryConfig::new(
            config.retry.max_attempts,
            Duration::from_millis(config.retry.base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(config.retry.max_delay_ms));

        let breaker = &config.circuit_breaker;
        let circuit_breaker = breaker.enabled.then(|| {
            CircuitBreakerConfig::new(
                breaker.failure_threshold,
                Duration::from_millis(breaker.reset_timeout_ms),
            )
        });

        Self {
            base_url: config.server.base_url(),
            timeout: config.server.request_timeout(),
            retry,
            circuit_breaker,
        }
    }
}

/// Per-request overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Send without an `Authorization` header
    pub skip_auth: bool,
    /// Make a single attempt
    pub skip_retry: bool,
    /// Total attempts for this request, initial try included
    pub max_retries: Option<u32>,
    /// Timeout for each HTTP exchange of this request
    pub timeout: Option<Duration>,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    #[must_use]
    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = Some(attempts);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// API client with resilience patterns
pub struct ApiClient<C: Clock = SystemClock> {
    http: HttpClient,
    auth: Arc<dyn AccessTokenProvider>,
    config: ApiClientConfig,
    breakers: DashMap<String, CircuitBreaker<C>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for ApiClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("breakers", &self.breakers.len())
            .finish_non_exhaustive()
    }
}

impl ApiClient<SystemClock> {
    /// Create a new API client
    ///
    /// # Errors
    ///
    /// `SYSTEM_CONFIG` if the base URL or breaker settings are invalid, or
    /// the HTTP client cannot be built.
    pub fn new(
        config: ApiClientConfig,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> GatewayResult<Self> {
        Self::with_clock(config, auth, Arc::new(SystemClock))
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }
}

impl<C: Clock> ApiClient<C> {
    /// Create a client whose breakers read time from `clock`
    pub fn with_clock(
        config: ApiClientConfig,
        auth: Arc<dyn AccessTokenProvider>,
        clock: Arc<C>,
    ) -> GatewayResult<Self> {
        let parsed = url::Url::parse(&config.base_url).map_err(|e| {
            GatewayError::config(format!("Invalid base URL '{}': {e}", config.base_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::config(format!(
                "Unsupported base URL scheme: {}",
                parsed.scheme()
            )));
        }
        if let Some(breaker) = &config.circuit_breaker {
            breaker.validate().map_err(|e| GatewayError::config(e.to_string()))?;
        }

        let http = HttpClient::builder().timeout(config.timeout).build().map_err(|e| {
            GatewayError::config(format!("Failed to build HTTP client: {}", e.message))
        })?;

        Ok(Self { http, auth, config, breakers: DashMap::new(), clock })
    }

    /// `<server_url>/<api_version>`
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    #[instrument(skip(self, options))]
    pub async fn get(
        &self,
        endpoint: &str,
        options: &RequestOptions,
    ) -> GatewayResult<ApiResponse> {
        self.make_request(Method::GET, endpoint, None, options).await
    }

    #[instrument(skip(self, body, options))]
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: &RequestOptions,
    ) -> GatewayResult<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.make_request(Method::POST, endpoint, Some(body), options).await
    }

    #[instrument(skip(self, body, options))]
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: &RequestOptions,
    ) -> GatewayResult<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.make_request(Method::PUT, endpoint, Some(body), options).await
    }

    #[instrument(skip(self, body, options))]
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: &RequestOptions,
    ) -> GatewayResult<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.make_request(Method::PATCH, endpoint, Some(body), options).await
    }

    #[instrument(skip(self, options))]
    pub async fn delete(
        &self,
        endpoint: &str,
        options: &RequestOptions,
    ) -> GatewayResult<ApiResponse> {
        self.make_request(Method::DELETE, endpoint, None, options).await
    }

    /// Run one logical request through the full pipeline
    ///
    /// # Errors
    ///
    /// Any [`GatewayError`]; non-2xx responses with a JSON object body are
    /// returned as an unsuccessful envelope instead, except for 401, 408,
    /// 429 and 5xx.
    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> GatewayResult<ApiResponse> {
        let url = self.url_for(endpoint);
        let context = format!("{method} {}", endpoint_path(endpoint));
        let breaker = self.breaker_for(&context)?;
        // One refresh-and-replay per logical request, across retries
        let auth_replayed = AtomicBool::new(false);
        let last_failure = Mutex::new(None);

        let call = Call {
            method: &method,
            url: &url,
            endpoint,
            body: body.as_ref(),
            options,
            auth_replayed: &auth_replayed,
            last_failure: &last_failure,
        };
        let breaker = breaker.as_ref();
        let attempt = || async move { self.attempt(call, breaker).await };

        if options.skip_retry {
            return attempt().await.map_err(AttemptError::into_gateway);
        }

        let mut retry = self.config.retry.clone();
        if let Some(attempts) = options.max_retries {
            retry.max_attempts = attempts;
        }
        retry_with_backoff(attempt, &retry, &context).await.map_err(AttemptError::into_gateway)
    }

    /// Probe `<base>/health` without auth or breaker, retrying at most once
    ///
    /// Never fails; any error is logged and reported as `false`.
    #[instrument(skip(self))]
    pub async fn test_connection(&self) -> bool {
        let url = self.url_for(HEALTH_PATH);
        let options = RequestOptions::new().skip_auth();
        let mut retry = self.config.retry.clone();
        retry.max_attempts = 2;

        let (url, options) = (url.as_str(), &options);
        let probe = || async move {
            let response = self.dispatch(&Method::GET, url, None, options, None).await?;
            let status = response.status().as_u16();
            match StatusCategory::of(status) {
                StatusCategory::Success => Ok(()),
                _ => Err(status_error(status, HEALTH_PATH, "", None)),
            }
        };

        match retry_with_backoff(probe, &retry, "test_connection").await {
            Ok(()) => {
                info!(base_url = %self.config.base_url, "Remote API reachable");
                true
            }
            Err(err) => {
                warn!(base_url = %self.config.base_url, error = %err, "Remote API unreachable");
                false
            }
        }
    }

    /// State of the breaker guarding `method` + `endpoint`, if one exists yet
    pub fn circuit_state(&self, method: &Method, endpoint: &str) -> Option<CircuitState> {
        let key = format!("{method} {}", endpoint_path(endpoint));
        self.breakers.get(&key).map(|b| b.state())
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn breaker_for(&self, key: &str) -> GatewayResult<Option<CircuitBreaker<C>>> {
        let Some(config) = &self.config.circuit_breaker else {
            return Ok(None);
        };
        if let Some(existing) = self.breakers.get(key) {
            return Ok(Some(existing.clone()));
        }

        let entry = self.breakers.entry(key.to_string()).or_try_insert_with(|| {
            CircuitBreaker::with_shared_clock(key, config.clone(), Arc::clone(&self.clock))
                .map_err(|e| GatewayError::config(e.to_string()))
        })?;
        Ok(Some(entry.clone()))
    }

    async fn attempt(
        &self,
        call: Call<'_>,
        breaker: Option<&CircuitBreaker<C>>,
    ) -> Result<ApiResponse, AttemptError> {
        let token = if call.options.skip_auth {
            None
        } else {
            Some(self.auth.access_token().await.map_err(AttemptError::Failed)?)
        };

        let result = match breaker {
            Some(breaker) => match breaker.execute(|| self.exchange(call, token)).await {
                Ok(response) => Ok(response),
                Err(ResilienceError::OperationFailed { source }) => Err(source),
                Err(rejected @ ResilienceError::CircuitOpen { .. }) => {
                    debug!(endpoint = call.endpoint, "Circuit open, not retrying");
                    let cause = call.last_failure.lock().take();
                    return Err(AttemptError::Rejected(
                        cause.unwrap_or_else(|| GatewayError::from(rejected)),
                    ));
                }
            },
            None => self.exchange(call, token).await,
        };

        result.map_err(|err| {
            *call.last_failure.lock() = Some(err.clone());
            AttemptError::Failed(err)
        })
    }

    /// One HTTP exchange, plus at most one replay after a 401
    async fn exchange(&self, call: Call<'_>, token: Option<String>) -> GatewayResult<ApiResponse> {
        let response = self
            .dispatch(call.method, call.url, call.body, call.options, token.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED || call.options.skip_auth {
            return self.decode(response, call.endpoint).await;
        }

        if call.auth_replayed.swap(true, Ordering::SeqCst) {
            warn!(endpoint = call.endpoint, "Token rejected again after refresh");
            return self.decode(response, call.endpoint).await;
        }

        info!(endpoint = call.endpoint, "Token rejected, refreshing and replaying request");
        let token = match self.auth.refresh_access_token().await {
            Ok(token) => token,
            Err(err) => {
                warn!(endpoint = call.endpoint, error = %err, "Token refresh after 401 failed");
                return Err(GatewayError::invalid_token(
                    "Authentication rejected and token refresh failed",
                )
                .with_details(json!({
                    "endpoint": call.endpoint,
                    "status": 401,
                    "refresh_error": err.code,
                })));
            }
        };

        let replay =
            self.dispatch(call.method, call.url, call.body, call.options, Some(&token)).await?;
        self.decode(replay, call.endpoint).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> GatewayResult<Response> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .timeout(options.timeout.unwrap_or(self.config.timeout));

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Custom {token}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        self.http.send(request).await
    }

    async fn decode(&self, response: Response, endpoint: &str) -> GatewayResult<ApiResponse> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text =
            response.text().await.map_err(|err| GatewayError::from(InfraError::from(err)))?;

        let category = StatusCategory::of(status);
        if category.always_raises() {
            debug!(endpoint, status, "Raising error response");
            return Err(status_error(status, endpoint, &text, retry_after));
        }

        let success = category == StatusCategory::Success;
        if text.trim().is_empty() {
            return if success {
                Ok(ApiResponse { success, data: None, message: None, errors: None, metadata: None })
            } else {
                Err(status_error(status, endpoint, &text, retry_after))
            };
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(body) if success || body.is_object() => Ok(normalize(status, body)),
            Err(_) if success => Ok(ApiResponse::ok(Value::String(text))),
            Ok(_) | Err(_) => Err(status_error(status, endpoint, &text, retry_after)),
        }
    }
}

/// Borrowed pieces of one logical request, shared by all its attempts
#[derive(Clone, Copy)]
struct Call<'a> {
    method: &'a Method,
    url: &'a str,
    endpoint: &'a str,
    body: Option<&'a Value>,
    options: &'a RequestOptions,
    auth_replayed: &'a AtomicBool,
    last_failure: &'a Mutex<Option<GatewayError>>,
}

/// Outcome of a failed pipeline attempt
///
/// `Rejected` comes from an open breaker and is never retried.
#[derive(Debug)]
enum AttemptError {
    Failed(GatewayError),
    Rejected(GatewayError),
}

impl AttemptError {
    fn into_gateway(self) -> GatewayError {
        match self {
            Self::Failed(err) | Self::Rejected(err) => err,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => err.fmt(f),
            Self::Rejected(err) => write!(f, "rejected by circuit breaker: {err}"),
        }
    }
}

impl ErrorClassification for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Failed(err) => err.is_retryable(),
            Self::Rejected(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Failed(err) => err.retry_after(),
            Self::Rejected(_) => None,
        }
    }
}

/// Endpoint without its query string, used for breaker keys
fn endpoint_path(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

/// Builder for API client
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<ApiClientConfig>,
    auth: Option<Arc<dyn AccessTokenProvider>>,
}

impl ApiClientBuilder {
    /// Set the API configuration
    pub fn config(mut self, config: ApiClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the authentication provider
    pub fn auth(mut self, auth: Arc<dyn AccessTokenProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build the API client
    ///
    /// # Errors
    ///
    /// `SYSTEM_CONFIG` if no auth provider was set or client creation fails
    pub fn build(self) -> GatewayResult<ApiClient> {
        let config = self.config.unwrap_or_default();
        let auth = self.auth.ok_or_else(|| GatewayError::config("Auth provider not set"))?;

        ApiClient::new(config, auth)
    }
}
