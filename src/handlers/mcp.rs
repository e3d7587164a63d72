//! # MCP API Handlers
//!
//! Tool-shaped views over the catalog and the invocation pipeline for MCP
//! clients.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::auth::{UserHeader, UserId};
use crate::contracts::{OperationDto, ParameterDto, ProviderDto};
use crate::error::{ApiError, ErrorKind};
use crate::handlers::types::{ApiResponse, ErrorEnvelope};
use crate::i18n::RequestLanguage;
use crate::server::AppState;

const ACTIVE: &str = "active";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallToolResponse {
    /// Adapter response of the recorded invocation
    #[schema(value_type = Object)]
    pub tool_result: Value,
    /// Error text when the tool itself reported a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /mcp/list_tools`
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ListToolsRequest {
    /// Case-insensitive filter over provider and operation names
    pub query: Option<String>,
    /// Accepted for client compatibility; unused
    #[schema(value_type = Option<Object>)]
    pub context: Option<Value>,
    /// Include providers that are not active
    pub allow_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ToolDescription {
    pub description: String,
    pub parameters: Vec<ParameterDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderTools {
    pub operations: BTreeMap<String, ToolDescription>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ListToolsResponse {
    pub tools: BTreeMap<String, ProviderTools>,
}

fn parse_tool_input(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(_) => Err(ApiError::from_kind(
            ErrorKind::Validation,
            "tool input must be a JSON object",
        )),
        Err(err) => Err(ApiError::from_kind(
            ErrorKind::Validation,
            format!("JSON syntax error: {err}"),
        )),
    }
}

fn matches(needle: &str, haystacks: &[&str]) -> bool {
    haystacks
        .iter()
        .any(|haystack| haystack.to_lowercase().contains(needle))
}

fn describe(operations: Vec<OperationDto>) -> BTreeMap<String, ToolDescription> {
    operations
        .into_iter()
        .map(|operation| {
            (
                operation.identifier,
                ToolDescription {
                    description: operation.description,
                    parameters: operation.parameters,
                },
            )
        })
        .collect()
}

fn filter_tools(
    provider: &ProviderDto,
    operations: BTreeMap<String, ToolDescription>,
    query: Option<&str>,
) -> BTreeMap<String, ToolDescription> {
    let Some(needle) = query else {
        return operations;
    };
    if matches(needle, &[&provider.summary.identifier, &provider.summary.name]) {
        return operations;
    }
    operations
        .into_iter()
        .filter(|(identifier, tool)| matches(needle, &[identifier, &tool.description]))
        .collect()
}

/// Call a tool; the call is recorded as an invocation
#[utoipa::path(
    post,
    path = "/mcp/call_tool/{provider_identifier}/{operation_identifier}",
    params(
        ("provider_identifier" = String, Path, description = "Provider identifier"),
        ("operation_identifier" = String, Path, description = "Tool name"),
        UserHeader
    ),
    request_body(content = Object, description = "Tool input; an empty body is an empty object"),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Tool result", body = ApiResponse<CallToolResponse>),
        (status = 400, description = "Invalid tool input", body = ErrorEnvelope),
        (status = 404, description = "Provider or tool not found", body = ErrorEnvelope),
        (status = 500, description = "Adapter failure", body = ErrorEnvelope)
    ),
    tag = "mcp"
)]
pub async fn call_tool(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((provider, operation)): Path<(String, String)>,
    body: Bytes,
) -> Result<ApiResponse<CallToolResponse>, ApiError> {
    let parameters = parse_tool_input(&body)?;
    let invocation = state
        .invocations
        .invoke_operation(user_id, &provider, &operation, parameters)
        .await?;

    let tool_result = invocation.response_json().unwrap_or(Value::Null);
    let error = match tool_result.get("success").and_then(Value::as_bool) {
        Some(false) => Some(
            tool_result
                .get("error")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .unwrap_or("tool reported an error")
                .to_string(),
        ),
        _ => None,
    };
    Ok(ApiResponse::ok(CallToolResponse { tool_result, error }))
}

/// Tools grouped by provider
#[utoipa::path(
    post,
    path = "/mcp/list_tools",
    params(UserHeader),
    request_body = ListToolsRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Tools by provider", body = ApiResponse<ListToolsResponse>),
    ),
    tag = "mcp"
)]
pub async fn list_tools(
    State(state): State<AppState>,
    RequestLanguage(language): RequestLanguage,
    body: Result<Json<ListToolsRequest>, JsonRejection>,
) -> Result<ApiResponse<ListToolsResponse>, ApiError> {
    // A missing body lists everything
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => ListToolsRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    let mut response = ListToolsResponse::default();
    for provider in state.providers.list_all(&language).await? {
        if !request.allow_disabled && provider.summary.status != ACTIVE {
            continue;
        }
        let operations = if provider.operations.is_empty() {
            match state.adapters.list_operations(&provider.summary.identifier).await {
                Ok(operations) => describe(operations),
                Err(error) => {
                    tracing::debug!(provider = %provider.summary.identifier, %error, "No tools from adapter");
                    BTreeMap::new()
                }
            }
        } else {
            describe(provider.operations.clone())
        };

        let operations = filter_tools(&provider, operations, query.as_deref());
        if query.is_some() && operations.is_empty() {
            continue;
        }
        response
            .tools
            .insert(provider.summary.identifier.clone(), ProviderTools { operations });
    }
    Ok(ApiResponse::ok(response))
}
