//! HTTP implementation of the token refresh port

use async_trait::async_trait;
use devicegate_common::error::{GatewayError, GatewayResult};
use devicegate_core::TokenRefresher;
use devicegate_domain::RefreshedToken;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::errors::status_error;
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Path of the refresh endpoint, relative to the versioned base URL
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Exchanges refresh tokens against `<base>/auth/refresh`
///
/// The call is unauthenticated and is never retried here; the token
/// manager decides what a failure means.
#[derive(Debug, Clone)]
pub struct ApiTokenRefresher {
    http: HttpClient,
    url: String,
}

impl ApiTokenRefresher {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self { http, url: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH) }
    }
}

#[async_trait]
impl TokenRefresher for ApiTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> GatewayResult<RefreshedToken> {
        debug!(endpoint = REFRESH_PATH, "Requesting token refresh");
        let request = self
            .http
            .request(Method::POST, &self.url)
            .json(&json!({ "refresh_token": refresh_token }));
        let response = self.http.send(request).await?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(InfraError::from)?;
        if !(200..300).contains(&status) {
            warn!(status, "Token refresh rejected");
            return Err(status_error(status, REFRESH_PATH, &body, None));
        }

        let value: Value = serde_json::from_str(&body)?;
        // Accept both a bare token object and one wrapped in `data`
        let payload = match value.get("data") {
            Some(data) if data.get("token").is_some() => data.clone(),
            _ => value,
        };
        serde_json::from_value(payload).map_err(|err| {
            GatewayError::invalid_token(format!("Refresh response missing token: {err}"))
        })
    }
}
