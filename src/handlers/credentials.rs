//! # Credential Handlers
//!
//! Store, inspect and remove the caller's credential for a provider.
//! Secret material is accepted but never returned.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{UserHeader, UserId};
use crate::contracts::{CredentialDto, CredentialSummaryDto, PermissionDto};
use crate::error::ApiError;
use crate::handlers::types::{ApiResponse, ErrorEnvelope};
use crate::i18n::RequestLanguage;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StoredCredentialResponse {
    pub credential: CredentialSummaryDto,
    /// Provider permissions covered by the stored OAuth scopes
    pub granted_permissions: Vec<PermissionDto>,
}

fn scopes_of(credential: &CredentialDto) -> Vec<String> {
    match credential {
        CredentialDto::OAuth(token) => token.scopes.clone(),
        _ => Vec::new(),
    }
}

/// Store or replace the caller's credential for a provider
#[utoipa::path(
    put,
    path = "/credentials/{provider_identifier}",
    params(
        ("provider_identifier" = String, Path, description = "Provider identifier"),
        UserHeader
    ),
    request_body(
        content = Object,
        description = "Tagged credential: apikey, oauth, basic or none",
        example = json!({"type": "apikey", "api_key": "sk-..."})
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Credential stored", body = ApiResponse<StoredCredentialResponse>),
        (status = 400, description = "Malformed credential", body = ErrorEnvelope),
        (status = 404, description = "Provider not found", body = ErrorEnvelope)
    ),
    tag = "credentials"
)]
pub async fn store_credential(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    RequestLanguage(language): RequestLanguage,
    Path(provider): Path<String>,
    body: Result<Json<CredentialDto>, JsonRejection>,
) -> Result<ApiResponse<StoredCredentialResponse>, ApiError> {
    let Json(credential) = body?;
    // Unknown providers are rejected before anything is written
    state.providers.get_provider(&provider, &language).await?;

    let scopes = scopes_of(&credential);
    let summary = state
        .credentials
        .store_credential(user_id, &provider, credential)
        .await?;
    let granted_permissions = if scopes.is_empty() {
        Vec::new()
    } else {
        state.providers.permissions_for_scopes(&provider, &scopes).await?
    };

    tracing::info!(user_id = %user_id, provider = %provider, kind = %summary.kind, "Credential stored");
    Ok(ApiResponse::ok(StoredCredentialResponse {
        credential: summary,
        granted_permissions,
    }))
}

/// Metadata of the caller's credential
#[utoipa::path(
    get,
    path = "/credentials/{provider_identifier}",
    params(
        ("provider_identifier" = String, Path, description = "Provider identifier"),
        UserHeader
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Credential metadata", body = ApiResponse<CredentialSummaryDto>),
        (status = 401, description = "No credential stored", body = ErrorEnvelope)
    ),
    tag = "credentials"
)]
pub async fn get_credential(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(provider): Path<String>,
) -> Result<ApiResponse<CredentialSummaryDto>, ApiError> {
    let summary = state
        .credentials
        .describe_credential(user_id, &provider)
        .await?;
    Ok(ApiResponse::ok(summary))
}

/// Remove the caller's credential
#[utoipa::path(
    delete,
    path = "/credentials/{provider_identifier}",
    params(
        ("provider_identifier" = String, Path, description = "Provider identifier"),
        UserHeader
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Credential removed"),
        (status = 401, description = "No credential stored", body = ErrorEnvelope)
    ),
    tag = "credentials"
)]
pub async fn delete_credential(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(provider): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .credentials
        .delete_credential(user_id, &provider)
        .await?;
    tracing::info!(user_id = %user_id, provider = %provider, "Credential deleted");
    Ok(ApiResponse::ok(()))
}
