//! # Module Contracts
//!
//! Facade traits through which modules call each other. A facade opens a
//! tracing span named after its method, converts domain objects to the
//! DTOs in [`dto`] and maps module errors onto [`ContractError`]. No
//! domain type crosses these traits.

pub mod dto;
mod error;

pub use dto::{
    AdapterInfoDto, AdapterStatusDto, CredentialDto, CredentialSummaryDto, OAuthTokenDto,
    OperationDto, ParameterDto, PermissionDto, ProviderDto, ProviderListQuery, ProviderPageDto,
    ProviderSummaryDto,
};
pub use error::ContractError;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::i18n::LanguageTag;

#[async_trait]
pub trait ProviderContract: Send + Sync {
    /// Full provider in the requested language. Deprecated providers stay
    /// addressable here.
    async fn get_provider(
        &self,
        identifier: &str,
        language: &LanguageTag,
    ) -> Result<ProviderDto, ContractError>;

    async fn list_providers(
        &self,
        query: &ProviderListQuery,
        language: &LanguageTag,
    ) -> Result<ProviderPageDto, ContractError>;

    /// Every non-deleted provider with operations, in the requested
    /// language.
    async fn list_all(&self, language: &LanguageTag) -> Result<Vec<ProviderDto>, ContractError>;

    async fn categories(&self) -> Result<Vec<String>, ContractError>;

    async fn permissions_for_scopes(
        &self,
        identifier: &str,
        scopes: &[String],
    ) -> Result<Vec<PermissionDto>, ContractError>;
}

#[async_trait]
pub trait CredentialContract: Send + Sync {
    /// Stored credential; `CREDENTIAL_NOT_FOUND` when absent.
    async fn get_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<CredentialDto, ContractError>;

    async fn none_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<CredentialDto, ContractError>;

    /// Atomically replaces the stored OAuth token.
    async fn replace_oauth_token(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        token: &OAuthTokenDto,
    ) -> Result<(), ContractError>;

    async fn touch_last_used(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<(), ContractError>;

    async fn store_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        credential: CredentialDto,
    ) -> Result<CredentialSummaryDto, ContractError>;

    async fn describe_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<CredentialSummaryDto, ContractError>;

    async fn delete_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<(), ContractError>;
}

#[async_trait]
pub trait AdapterContract: Send + Sync {
    /// `PROVIDER_ADAPTER_NOT_FOUND` when no adapter is loaded.
    async fn adapter_info(&self, provider_identifier: &str) -> Result<AdapterInfoDto, ContractError>;

    /// Operations the adapter can execute, discovering them when needed.
    async fn list_operations(
        &self,
        provider_identifier: &str,
    ) -> Result<Vec<OperationDto>, ContractError>;

    async fn token_needs_refresh(
        &self,
        provider_identifier: &str,
        token: &OAuthTokenDto,
    ) -> Result<bool, ContractError>;

    async fn refresh_token(
        &self,
        provider_identifier: &str,
        token: &OAuthTokenDto,
    ) -> Result<OAuthTokenDto, ContractError>;

    async fn execute(
        &self,
        provider_identifier: &str,
        operation_identifier: &str,
        parameters: Value,
        credential: CredentialDto,
    ) -> Result<Value, ContractError>;

    async fn adapter_statuses(&self) -> Vec<AdapterStatusDto>;

    async fn reload_provider(&self, identifier: &str) -> Result<AdapterStatusDto, ContractError>;

    async fn reload_all(&self) -> Result<Vec<AdapterStatusDto>, ContractError>;
}
