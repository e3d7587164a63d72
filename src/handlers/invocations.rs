//! # Invocation API Handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{UserHeader, UserId};
use crate::error::ApiError;
use crate::handlers::types::{ApiResponse, ErrorEnvelope};
use crate::invocations::{Invocation, InvocationPage};
use crate::server::AppState;

/// Invocation record as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvocationView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_identifier: String,
    pub operation_identifier: String,
    /// pending, success or failed
    pub status: String,
    #[schema(value_type = Object)]
    pub parameters: Value,
    /// Decoded adapter response, present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl From<Invocation> for InvocationView {
    fn from(invocation: Invocation) -> Self {
        Self {
            response: invocation.response_json(),
            id: invocation.id,
            user_id: invocation.user_id,
            provider_identifier: invocation.provider_identifier,
            operation_identifier: invocation.operation_identifier,
            status: invocation.status.to_string(),
            parameters: invocation.parameters,
            error_message: invocation.error_message,
            started_at: invocation.started_at,
            completed_at: invocation.completed_at,
            duration_ms: invocation.duration_ms,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvocationListResponse {
    pub items: Vec<InvocationView>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

impl From<InvocationPage> for InvocationListResponse {
    fn from(page: InvocationPage) -> Self {
        Self {
            items: page.items.into_iter().map(InvocationView::from).collect(),
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListInvocationsQuery {
    /// Page size (default: 20, max: 100)
    pub limit: Option<u64>,
    /// Rows to skip (default: 0)
    pub offset: Option<u64>,
}

/// Body of an invocation request
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct InvokeRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub parameters: Map<String, Value>,
}

/// List the caller's invocations, newest first
#[utoipa::path(
    get,
    path = "/invocations",
    params(ListInvocationsQuery, UserHeader),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Page of invocations", body = ApiResponse<InvocationListResponse>),
        (status = 401, description = "Unauthorized", body = ErrorEnvelope)
    ),
    tag = "invocations"
)]
pub async fn list_invocations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<ListInvocationsQuery>,
) -> Result<ApiResponse<InvocationListResponse>, ApiError> {
    let page = state
        .invocations
        .list_for_user(user_id, query.limit, query.offset)
        .await?;
    Ok(ApiResponse::ok(page.into()))
}

/// Fetch one of the caller's invocations
#[utoipa::path(
    get,
    path = "/invocations/{id}",
    params(("id" = Uuid, Path, description = "Invocation id"), UserHeader),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Invocation", body = ApiResponse<InvocationView>),
        (status = 403, description = "Invocation belongs to another user", body = ErrorEnvelope),
        (status = 404, description = "Invocation not found", body = ErrorEnvelope)
    ),
    tag = "invocations"
)]
pub async fn get_invocation(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<InvocationView>, ApiError> {
    let invocation = state.invocations.get_for_user(user_id, id).await?;
    Ok(ApiResponse::ok(invocation.into()))
}

/// Invoke an operation on behalf of the caller
#[utoipa::path(
    post,
    path = "/invocations/{provider_identifier}/{operation_identifier}",
    params(
        ("provider_identifier" = String, Path, description = "Provider identifier"),
        ("operation_identifier" = String, Path, description = "Operation identifier"),
        UserHeader
    ),
    request_body = InvokeRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Completed invocation", body = ApiResponse<InvocationView>),
        (status = 400, description = "Invalid parameters", body = ErrorEnvelope),
        (status = 401, description = "Missing credential or identity", body = ErrorEnvelope),
        (status = 404, description = "Provider or operation not found", body = ErrorEnvelope),
        (status = 429, description = "Rate limited", body = ErrorEnvelope),
        (status = 500, description = "Adapter failure", body = ErrorEnvelope),
        (status = 503, description = "Provider circuit open", body = ErrorEnvelope)
    ),
    tag = "invocations"
)]
pub async fn invoke_operation(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((provider, operation)): Path<(String, String)>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<ApiResponse<InvocationView>, ApiError> {
    let Json(request) = body?;
    let invocation = state
        .invocations
        .invoke_operation(user_id, &provider, &operation, Value::Object(request.parameters))
        .await?;
    Ok(ApiResponse::ok(invocation.into()))
}
