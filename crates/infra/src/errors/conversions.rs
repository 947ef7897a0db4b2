//! Conversions from external infrastructure errors into gateway errors.

use devicegate_common::error::{ErrorCode, GatewayError};
use reqwest::Error as HttpError;
use serde_json::json;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the shared error type.
#[derive(Debug)]
pub struct InfraError(pub GatewayError);

impl From<InfraError> for GatewayError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<GatewayError> for InfraError {
    fn from(value: GatewayError) -> Self {
        InfraError(value)
    }
}

trait IntoGatewayError {
    fn into_gateway(self) -> GatewayError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → GatewayError */
/* -------------------------------------------------------------------------- */

impl IntoGatewayError for HttpError {
    fn into_gateway(self) -> GatewayError {
        let url = self.url().map(|u| u.path().to_string());

        if self.is_builder() {
            return GatewayError::internal(format!("Invalid HTTP request: {self}"));
        }

        if self.is_timeout() {
            return GatewayError::timeout("HTTP request timed out")
                .with_details(json!({ "path": url }));
        }

        if self.is_connect() {
            return GatewayError::connection_failed(format!("HTTP connection failure: {self}"))
                .with_details(json!({ "path": url }));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
            return GatewayError::new(ErrorCode::from_status(code), message)
                .with_details(json!({ "status": code, "path": url }));
        }

        if self.is_decode() {
            return GatewayError::internal(format!("Failed to decode response body: {self}"));
        }

        GatewayError::connection_failed(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_gateway())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
