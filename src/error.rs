//! # Error Handling
//!
//! Unified error handling for the gateway. Every failure that reaches the
//! HTTP surface is rendered as the standard envelope
//! `{success:false, code, message, data:{error, cause?, details?, trace_id?}}`
//! where `code` is the HTTP status and `data.error` the stable error code.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::telemetry;

/// Stable error kinds shared by every module of the gateway.
///
/// Each kind carries a SCREAMING_SNAKE_CASE code and an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    RateLimited,
    AuthFailed,
    OperationNotSupported,
    InvalidParameters,
    ProviderApiError,
    AdapterExecuteFailed,
    CircuitOpen,
    Internal,
    ProviderNotFound,
    ProviderAdapterNotFound,
    OperationNotFound,
    CredentialNotFound,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::AuthFailed => "AUTH_FAILED",
            ErrorKind::OperationNotSupported => "OPERATION_NOT_SUPPORTED",
            ErrorKind::InvalidParameters => "INVALID_PARAMETERS",
            ErrorKind::ProviderApiError => "PROVIDER_API_ERROR",
            ErrorKind::AdapterExecuteFailed => "ADAPTER_EXECUTE_FAILED",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::ProviderNotFound => "PROVIDER_NOT_FOUND",
            ErrorKind::ProviderAdapterNotFound => "PROVIDER_ADAPTER_NOT_FOUND",
            ErrorKind::OperationNotFound => "OPERATION_NOT_FOUND",
            ErrorKind::CredentialNotFound => "CREDENTIAL_NOT_FOUND",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::InvalidParameters => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound
            | ErrorKind::OperationNotSupported
            | ErrorKind::ProviderNotFound
            | ErrorKind::ProviderAdapterNotFound
            | ErrorKind::OperationNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized | ErrorKind::AuthFailed | ErrorKind::CredentialNotFound => {
                StatusCode::UNAUTHORIZED
            }
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ProviderApiError => StatusCode::BAD_GATEWAY,
            ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::AdapterExecuteFailed | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Kinds caused by the caller or by a local policy rather than by a
    /// broken dependency. A wrapped error with such a cause keeps the
    /// cause's status on the wire.
    pub fn is_caller_facing(&self) -> bool {
        !matches!(
            self,
            ErrorKind::ProviderApiError | ErrorKind::AdapterExecuteFailed | ErrorKind::Internal
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Unified API error response structure
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code for the response
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Code of the underlying failure when this error wraps another one
    pub cause: Option<Box<str>>,
    /// Additional error details (optional)
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            cause: None,
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Create an error for one of the shared error kinds
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.status_code(), kind.code().to_string(), message.into())
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Record the code of the wrapped failure
    pub fn with_cause(mut self, cause: ErrorKind) -> Self {
        self.cause = Some(cause.code().into());
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).into_boxed_str())
            })
    }

    fn envelope(&self) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        data.insert("error".into(), json!(self.code.as_ref()));
        if let Some(cause) = &self.cause {
            data.insert("cause".into(), json!(cause.as_ref()));
        }
        if let Some(details) = &self.details {
            data.insert("details".into(), details.as_ref().clone());
        }
        if let Some(trace_id) = &self.trace_id {
            data.insert("trace_id".into(), json!(trace_id.as_ref()));
        }
        json!({
            "success": false,
            "code": self.status.as_u16(),
            "message": self.message.as_ref(),
            "data": data,
        })
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .map(|code| {
            let code = code.as_ref();
            code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code)
        })
        .unwrap_or(false)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        if let Some(trace_id) = &self.trace_id
            && let Ok(header_value) = HeaderValue::from_str(trace_id)
        {
            headers.insert(telemetry::TRACE_ID_HEADER, header_value);
        }

        let body = self.envelope();
        (self.status, headers, axum::Json(body)).into_response()
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        let message = match kind {
            ErrorKind::NotFound => "Not Found",
            ErrorKind::Unauthorized => "Authentication required",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::RateLimited => "Too many requests",
            ErrorKind::CircuitOpen => "Service temporarily unavailable",
            _ => "Request failed",
        };
        Self::from_kind(kind, message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);
        Self::from_kind(ErrorKind::Internal, "An internal error occurred")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::from_kind(ErrorKind::Validation, message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::from_kind(ErrorKind::Conflict, "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => {
                Self::from_kind(ErrorKind::NotFound, format!("Record not found: {}", record))
            }
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "INTERNAL",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::from_kind(ErrorKind::Internal, "Database error occurred")
            }
        }
    }
}

impl From<crate::contracts::ContractError> for ApiError {
    fn from(error: crate::contracts::ContractError) -> Self {
        let kind = error.kind();
        let status = match error.cause() {
            Some(cause) if cause.is_caller_facing() => cause.status_code(),
            _ => kind.status_code(),
        };

        if status.is_server_error() {
            tracing::error!(code = kind.code(), error = %error, "Request failed");
        }

        let mut api_error = Self::new(status, kind.code().to_string(), error.message().to_string());
        if let Some(cause) = error.cause() {
            api_error = api_error.with_cause(cause);
        }
        if let Some(retry_after) = error.retry_after() {
            api_error = api_error.with_retry_after(retry_after);
        }
        api_error
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    ApiError::from_kind(
        ErrorKind::Unauthorized,
        message.unwrap_or("Authentication required"),
    )
}

/// Create a forbidden error (403)
pub fn forbidden(message: Option<&str>) -> ApiError {
    ApiError::from_kind(ErrorKind::Forbidden, message.unwrap_or("Forbidden"))
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::from_kind(ErrorKind::Validation, message).with_details(field_errors)
}
