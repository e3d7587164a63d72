//! # Common API Types
//!
//! The response envelope shared by every endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorKind;

/// Successful response envelope: `{success, code, message, data?}`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Always true for successful responses
    pub success: bool,
    /// HTTP status code
    pub code: u16,
    /// Human-readable status message
    pub message: String,
    /// Response payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            code: StatusCode::OK.as_u16(),
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Payload of a failed response's `data` field
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorData {
    /// Stable error code
    pub error: ErrorKind,
    /// Code of the wrapped failure, when any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorKind>,
    /// Field-level details for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Request correlation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Failed response envelope, documented for OpenAPI consumers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": false,
    "code": 404,
    "message": "provider 'jira' not found",
    "data": {"error": "PROVIDER_NOT_FOUND", "trace_id": "4bf92f3577b34da6a3ce929d0e0e4736"}
}))]
pub struct ErrorEnvelope {
    pub success: bool,
    pub code: u16,
    pub message: String,
    pub data: ErrorData,
}
