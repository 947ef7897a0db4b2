//! Generic response envelope returned to tool handlers

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pagination fields reported by list endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl PaginationMetadata {
    pub fn is_empty(&self) -> bool {
        self.offset.is_none() && self.limit.is_none() && self.total.is_none()
    }
}

/// Normalized API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaginationMetadata>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), message: None, errors: None, metadata: None }
    }

    pub fn failure(message: Option<String>, errors: Option<Value>) -> Self {
        Self { success: false, data: None, message, errors, metadata: None }
    }

    /// Convert the payload, keeping the envelope
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
            errors: self.errors,
            metadata: self.metadata,
        }
    }
}

impl ApiResponse<Value> {
    /// Deserialize `data` into a concrete type
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> serde_json::Result<ApiResponse<T>> {
        let data = self.data.map(serde_json::from_value).transpose()?;
        Ok(ApiResponse {
            success: self.success,
            data,
            message: self.message,
            errors: self.errors,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_absent_fields_are_omitted() {
        let value = serde_json::to_value(ApiResponse::ok(json!({ "id": 1 }))).unwrap();
        assert_eq!(value, json!({ "success": true, "data": { "id": 1 } }));
    }

    #[test]
    fn test_decode_typed_payload() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Device {
            id: u32,
        }

        let response = ApiResponse::ok(json!({ "id": 7 })).decode::<Device>().unwrap();
        assert_eq!(response.data, Some(Device { id: 7 }));
    }
}
