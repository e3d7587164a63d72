//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the gateway API.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorKind};
use crate::handlers::types::{ApiResponse, ErrorEnvelope};
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod adapters;
pub mod credentials;
pub mod invocations;
pub mod mcp;
pub mod providers;
pub mod types;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub database: String,
    pub adapters_loaded: usize,
}

/// Liveness plus a database round trip
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Healthy", body = ApiResponse<HealthStatus>),
        (status = 500, description = "Database unreachable", body = ErrorEnvelope)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<ApiResponse<HealthStatus>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = %err, "Health check failed");
        ApiError::from_kind(ErrorKind::Internal, "database unreachable")
    })?;
    let adapters_loaded = state
        .adapters
        .adapter_statuses()
        .await
        .iter()
        .filter(|status| status.loaded)
        .count();
    Ok(ApiResponse::ok(HealthStatus {
        database: "ok".to_string(),
        adapters_loaded,
    }))
}
