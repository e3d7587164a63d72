//! # Adapter Administration Handlers

use axum::extract::{Path, State};

use crate::contracts::AdapterStatusDto;
use crate::error::ApiError;
use crate::handlers::types::{ApiResponse, ErrorEnvelope};
use crate::server::AppState;

/// Load state of every configured adapter
#[utoipa::path(
    get,
    path = "/adapters",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Adapter statuses", body = ApiResponse<Vec<AdapterStatusDto>>),
        (status = 401, description = "Unauthorized", body = ErrorEnvelope)
    ),
    tag = "adapters"
)]
pub async fn list_adapters(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<AdapterStatusDto>>, ApiError> {
    Ok(ApiResponse::ok(state.adapters.adapter_statuses().await))
}

/// Rebuild one provider's adapter from its stored configuration
#[utoipa::path(
    post,
    path = "/adapters/reload/{identifier}",
    params(("identifier" = String, Path, description = "Provider identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Adapter reloaded", body = ApiResponse<AdapterStatusDto>),
        (status = 404, description = "No adapter configuration", body = ErrorEnvelope),
        (status = 500, description = "Adapter construction failed", body = ErrorEnvelope)
    ),
    tag = "adapters"
)]
pub async fn reload_adapter(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<ApiResponse<AdapterStatusDto>, ApiError> {
    let status = state.adapters.reload_provider(&identifier).await?;
    tracing::info!(provider = %identifier, loaded = status.loaded, "Adapter reloaded");
    Ok(ApiResponse::ok(status))
}

/// Rebuild every adapter
#[utoipa::path(
    post,
    path = "/adapters/reload_all",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Per-provider reload results", body = ApiResponse<Vec<AdapterStatusDto>>),
    ),
    tag = "adapters"
)]
pub async fn reload_all_adapters(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<AdapterStatusDto>>, ApiError> {
    let statuses = state.adapters.reload_all().await?;
    let failed = statuses.iter().filter(|status| !status.loaded).count();
    tracing::info!(total = statuses.len(), failed, "Adapters reloaded");
    Ok(ApiResponse::ok(statuses))
}
