//! Response normalization
//!
//! The remote API answers with several body layouts. Each body is decoded
//! into a [`ResponseShape`] first and then folded into the single
//! [`ApiResponse`] envelope handed to callers.

use devicegate_domain::{ApiResponse, PaginationMetadata};
use serde_json::Value;

/// Structural classification of a JSON response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// Carries at least one of `offset`, `limit`, `total`
    Paginated { data: Value, metadata: PaginationMetadata },
    /// Carries `message` or `errors` and no pagination fields
    ErrorBody { message: Option<String>, errors: Option<Value> },
    /// Any other object
    Plain(Value),
    /// Arrays, strings, numbers, booleans and null
    Scalar(Value),
}

impl ResponseShape {
    pub fn classify(body: Value) -> Self {
        let Value::Object(mut map) = body else {
            return Self::Scalar(body);
        };

        let metadata = PaginationMetadata {
            offset: map.get("offset").and_then(Value::as_u64),
            limit: map.get("limit").and_then(Value::as_u64),
            total: map.get("total").and_then(Value::as_u64),
        };
        let has_pagination = ["offset", "limit", "total"].iter().any(|k| map.contains_key(*k));

        if has_pagination {
            let data = map.get("data").filter(|d| !d.is_null()).cloned();
            let data = data.unwrap_or_else(|| Value::Object(map));
            return Self::Paginated { data, metadata };
        }

        if map.contains_key("message") || map.contains_key("errors") {
            let message = map.get("message").and_then(|m| match m {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            });
            let errors = map.remove("errors").filter(|e| !e.is_null());
            return Self::ErrorBody { message, errors };
        }

        Self::Plain(Value::Object(map))
    }

    /// Fold into the envelope; `success` is whether the HTTP status was 2xx
    pub fn into_response(self, success: bool) -> ApiResponse {
        match self {
            Self::Paginated { data, metadata } => ApiResponse {
                success,
                data: Some(data),
                message: None,
                errors: None,
                metadata: Some(metadata),
            },
            Self::ErrorBody { message, errors } => ApiResponse::failure(message, errors),
            Self::Plain(body) => ApiResponse {
                success,
                data: Some(body),
                message: None,
                errors: None,
                metadata: None,
            },
            Self::Scalar(body) => ApiResponse::ok(body),
        }
    }
}

/// Classify and fold `body` in one step
pub fn normalize(status: u16, body: Value) -> ApiResponse {
    ResponseShape::classify(body).into_response((200..300).contains(&status))
}
