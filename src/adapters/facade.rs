use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::catalog::parameter_dto;
use crate::contracts::{
    AdapterContract, AdapterInfoDto, AdapterStatusDto, ContractError, CredentialDto, OAuthTokenDto,
    OperationDto,
};
use crate::error::ErrorKind;

use super::factory::{AdapterFactory, AdapterStatus};
use super::{Adapter, AdapterError, AdapterOperation};

impl From<AdapterError> for ContractError {
    fn from(error: AdapterError) -> Self {
        let kind = match &error {
            AdapterError::OperationNotSupported(_) => ErrorKind::OperationNotSupported,
            AdapterError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            AdapterError::Unauthorized(_) => ErrorKind::Unauthorized,
            AdapterError::AuthFailed(_) => ErrorKind::AuthFailed,
            AdapterError::Upstream(_) | AdapterError::Timeout(_) => ErrorKind::ProviderApiError,
            AdapterError::InvalidConfig { .. } => ErrorKind::Validation,
            AdapterError::NotConfigured(_) | AdapterError::UnknownTemplate(_) => {
                ErrorKind::ProviderAdapterNotFound
            }
            AdapterError::Discovery(_) | AdapterError::Source(_) => {
                tracing::error!(%error, "Adapter failure");
                ErrorKind::Internal
            }
        };
        ContractError::new(kind, error.to_string())
    }
}

fn status_dto(status: AdapterStatus) -> AdapterStatusDto {
    AdapterStatusDto {
        identifier: status.identifier,
        loaded: status.loaded,
        template: status.template,
        error: status.error,
    }
}

fn operation_dto(operation: AdapterOperation) -> OperationDto {
    OperationDto {
        name: operation.identifier.clone(),
        identifier: operation.identifier,
        description: operation.description,
        category: String::new(),
        required_permissions: Vec::new(),
        required_scopes: Vec::new(),
        parameters: operation.parameters.iter().map(parameter_dto).collect(),
    }
}

fn adapter_not_found(identifier: &str) -> ContractError {
    ContractError::new(
        ErrorKind::ProviderAdapterNotFound,
        format!("no adapter loaded for provider '{identifier}'"),
    )
}

/// [`AdapterContract`] over the adapter factory.
#[derive(Clone)]
pub struct AdapterFacade {
    factory: Arc<AdapterFactory>,
}

impl AdapterFacade {
    pub fn new(factory: Arc<AdapterFactory>) -> Self {
        Self { factory }
    }

    async fn adapter(&self, identifier: &str) -> Result<Arc<dyn Adapter>, ContractError> {
        self.factory
            .get_adapter(identifier)
            .await
            .ok_or_else(|| adapter_not_found(identifier))
    }
}

#[async_trait]
impl AdapterContract for AdapterFacade {
    #[instrument(name = "AdapterContract.adapter_info", skip(self))]
    async fn adapter_info(&self, provider_identifier: &str) -> Result<AdapterInfoDto, ContractError> {
        let info = self.adapter(provider_identifier).await?.info();
        Ok(AdapterInfoDto {
            identifier: info.identifier,
            name: info.name,
            description: info.description,
            auth_type: info.auth_type.as_str().to_string(),
            template: info.template,
        })
    }

    #[instrument(name = "AdapterContract.list_operations", skip(self))]
    async fn list_operations(&self, provider_identifier: &str) -> Result<Vec<OperationDto>, ContractError> {
        let operations = self.adapter(provider_identifier).await?.operations().await?;
        Ok(operations.into_iter().map(operation_dto).collect())
    }

    #[instrument(name = "AdapterContract.token_needs_refresh", skip(self, token))]
    async fn token_needs_refresh(
        &self,
        provider_identifier: &str,
        token: &OAuthTokenDto,
    ) -> Result<bool, ContractError> {
        Ok(self
            .factory
            .get_oauth_adapter(provider_identifier)
            .await
            .is_some_and(|oauth| oauth.is_token_expiring(token)))
    }

    #[instrument(name = "AdapterContract.refresh_token", skip(self, token))]
    async fn refresh_token(
        &self,
        provider_identifier: &str,
        token: &OAuthTokenDto,
    ) -> Result<OAuthTokenDto, ContractError> {
        let oauth = self
            .factory
            .get_oauth_adapter(provider_identifier)
            .await
            .ok_or_else(|| {
                ContractError::new(
                    ErrorKind::AuthFailed,
                    format!("provider '{provider_identifier}' does not support token refresh"),
                )
            })?;
        Ok(oauth.refresh_token(token).await?)
    }

    #[instrument(name = "AdapterContract.execute", skip(self, parameters, credential))]
    async fn execute(
        &self,
        provider_identifier: &str,
        operation_identifier: &str,
        parameters: Value,
        credential: CredentialDto,
    ) -> Result<Value, ContractError> {
        let adapter = self.adapter(provider_identifier).await?;
        Ok(adapter
            .execute(operation_identifier, parameters, &credential)
            .await?)
    }

    #[instrument(name = "AdapterContract.adapter_statuses", skip(self))]
    async fn adapter_statuses(&self) -> Vec<AdapterStatusDto> {
        self.factory
            .statuses()
            .await
            .into_iter()
            .map(status_dto)
            .collect()
    }

    #[instrument(name = "AdapterContract.reload_provider", skip(self))]
    async fn reload_provider(&self, identifier: &str) -> Result<AdapterStatusDto, ContractError> {
        Ok(status_dto(self.factory.reload_provider(identifier).await?))
    }

    #[instrument(name = "AdapterContract.reload_all", skip(self))]
    async fn reload_all(&self) -> Result<Vec<AdapterStatusDto>, ContractError> {
        Ok(self
            .factory
            .reload_all()
            .await?
            .into_iter()
            .map(status_dto)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TemplateRegistry;
    use crate::adapters::factory::testing::StaticConfigSource;
    use crate::adapters::mcp::testing::{FakeConnector, tool};
    use crate::adapters::ProviderAdapterConfig;
    use crate::catalog::AuthType;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    async fn facade() -> AdapterFacade {
        let connector = FakeConnector::with_tools(vec![tool(
            "list_allowed_directories",
            json!({"type": "object"}),
        )]);
        let config = ProviderAdapterConfig {
            id: Uuid::new_v4(),
            identifier: "filesystem".into(),
            name: "Filesystem".into(),
            description: String::new(),
            auth_type: AuthType::None,
            oauth_config: None,
            custom_config: json!({"template": "mcp", "mcp": {"command": "npx"}})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let registry = TemplateRegistry::with_defaults(
            Arc::new(connector),
            Duration::from_secs(5),
            Duration::from_secs(300),
        );
        let factory = AdapterFactory::new(
            Arc::new(registry),
            Arc::new(StaticConfigSource::new(vec![config])),
        );
        factory.reload_all().await.unwrap();
        AdapterFacade::new(Arc::new(factory))
    }

    #[tokio::test]
    async fn unknown_provider_is_adapter_not_found() {
        let err = facade().await.adapter_info("github").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderAdapterNotFound);
    }

    #[tokio::test]
    async fn lists_discovered_operations() {
        let facade = facade().await;
        let info = facade.adapter_info("filesystem").await.unwrap();
        assert_eq!(info.auth_type, "none");

        let operations = facade.list_operations("filesystem").await.unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].identifier, "list_allowed_directories");
        assert!(operations[0].required_scopes.is_empty());
    }

    #[tokio::test]
    async fn providers_without_oauth_never_refresh() {
        let facade = facade().await;
        let token = OAuthTokenDto {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expiry: Some(chrono::Utc::now()),
            scopes: vec![],
        };
        assert!(!facade.token_needs_refresh("filesystem", &token).await.unwrap());
        assert_eq!(
            facade.refresh_token("filesystem", &token).await.unwrap_err().kind(),
            ErrorKind::AuthFailed
        );
    }

    #[test]
    fn maps_adapter_errors_to_contract_kinds() {
        let cases = [
            (AdapterError::OperationNotSupported("x".into()), ErrorKind::OperationNotSupported),
            (AdapterError::InvalidParameters("x".into()), ErrorKind::InvalidParameters),
            (AdapterError::Timeout(Duration::from_secs(1)), ErrorKind::ProviderApiError),
            (AdapterError::Discovery("x".into()), ErrorKind::Internal),
            (AdapterError::AuthFailed("x".into()), ErrorKind::AuthFailed),
        ];
        for (error, kind) in cases {
            assert_eq!(ContractError::from(error).kind(), kind);
        }
    }
}
