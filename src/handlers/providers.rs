//! # Providers API Handlers
//!
//! Public, translated provider metadata.

use axum::extract::{Path, State};
use axum::extract::rejection::JsonRejection;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::catalog::MAX_PAGE_SIZE;
use crate::contracts::{ProviderDto, ProviderListQuery, ProviderPageDto, ProviderSummaryDto};
use crate::error::{ApiError, ErrorKind};
use crate::handlers::types::{ApiResponse, ErrorEnvelope};
use crate::i18n::RequestLanguage;
use crate::server::AppState;

/// Filters of a provider search
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct ProviderFilters {
    pub tag: Option<String>,
    /// One of oauth, apikey, basic, none
    pub auth_type: Option<String>,
    /// Case-insensitive substring of the provider name
    pub provider_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct Pagination {
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size, capped at 100
    pub page_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct Sort {
    /// One of created_at, updated_at, name, identifier
    pub field: Option<String>,
    /// asc or desc
    pub order: Option<String>,
}

/// Body of `POST /providers/filter`
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct FilterProvidersRequest {
    pub filters: ProviderFilters,
    pub pagination: Pagination,
    pub sort: Sort,
}

impl FilterProvidersRequest {
    fn into_query(self) -> ProviderListQuery {
        ProviderListQuery {
            status: None,
            include_inactive: false,
            auth_type: self.filters.auth_type,
            tag: self.filters.tag,
            name: self.filters.provider_name,
            sort_field: self.sort.field,
            sort_order: self.sort.order,
            page: self.pagination.page,
            page_size: self.pagination.page_size.map(|size| size.clamp(1, MAX_PAGE_SIZE)),
        }
    }
}

/// List active providers in brief form
#[utoipa::path(
    get,
    path = "/providers",
    responses(
        (status = 200, description = "Active providers", body = ApiResponse<Vec<ProviderSummaryDto>>),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
    RequestLanguage(language): RequestLanguage,
) -> Result<ApiResponse<Vec<ProviderSummaryDto>>, ApiError> {
    let providers = state.providers.list_all(&language).await?;
    let active = providers
        .into_iter()
        .map(|provider| provider.summary)
        .filter(|summary| summary.status == "active")
        .collect();
    Ok(ApiResponse::ok(active))
}

/// Unique category set across providers
#[utoipa::path(
    get,
    path = "/providers/categories",
    responses(
        (status = 200, description = "Categories", body = ApiResponse<Vec<String>>),
    ),
    tag = "providers"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<String>>, ApiError> {
    Ok(ApiResponse::ok(state.providers.categories().await?))
}

/// Search providers with filters, pagination and sorting
#[utoipa::path(
    post,
    path = "/providers/filter",
    request_body = FilterProvidersRequest,
    responses(
        (status = 200, description = "Page of providers", body = ApiResponse<ProviderPageDto>),
        (status = 400, description = "Invalid filter, sort or pagination", body = ErrorEnvelope)
    ),
    tag = "providers"
)]
pub async fn filter_providers(
    State(state): State<AppState>,
    RequestLanguage(language): RequestLanguage,
    body: Result<Json<FilterProvidersRequest>, JsonRejection>,
) -> Result<ApiResponse<ProviderPageDto>, ApiError> {
    let Json(request) = body?;
    let page = state
        .providers
        .list_providers(&request.into_query(), &language)
        .await?;
    Ok(ApiResponse::ok(page))
}

/// Full provider with its operations, translated per `Accept-Language`
#[utoipa::path(
    get,
    path = "/providers/{identifier}",
    params(("identifier" = String, Path, description = "Provider identifier")),
    responses(
        (status = 200, description = "Provider", body = ApiResponse<ProviderDto>),
        (status = 404, description = "Provider not found", body = ErrorEnvelope)
    ),
    tag = "providers"
)]
pub async fn get_provider(
    State(state): State<AppState>,
    RequestLanguage(language): RequestLanguage,
    Path(identifier): Path<String>,
) -> Result<ApiResponse<ProviderDto>, ApiError> {
    let provider = state
        .providers
        .get_provider(&identifier, &language)
        .await
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                ApiError::from_kind(ErrorKind::ProviderNotFound, err.message().to_string())
            }
            _ => err.into(),
        })?;
    Ok(ApiResponse::ok(provider))
}
