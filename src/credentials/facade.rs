use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use crate::contracts::{
    ContractError, CredentialContract, CredentialDto, CredentialSummaryDto, OAuthTokenDto,
};
use crate::error::ErrorKind;

use super::{Credential, CredentialError, CredentialStore, Secret};

impl From<CredentialError> for ContractError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::NotFound { provider, .. } => ContractError::new(
                ErrorKind::CredentialNotFound,
                format!("no credential stored for provider '{provider}'"),
            ),
            CredentialError::Invalid(message) => ContractError::new(ErrorKind::Validation, message),
            other => {
                tracing::error!(error = %other, "Credential store failure");
                ContractError::internal("credential store unavailable")
            }
        }
    }
}

fn to_dto(credential: Credential) -> CredentialDto {
    match credential.secret {
        Secret::ApiKey { api_key } => CredentialDto::ApiKey { api_key },
        Secret::Basic { username, password } => CredentialDto::Basic { username, password },
        Secret::OAuth {
            access_token,
            refresh_token,
        } => CredentialDto::OAuth(OAuthTokenDto {
            access_token,
            refresh_token,
            expiry: credential.expires_at,
            scopes: credential.scopes,
        }),
    }
}

fn summary(credential: &Credential) -> CredentialSummaryDto {
    CredentialSummaryDto {
        provider_identifier: credential.provider_identifier.clone(),
        kind: credential.secret.kind().to_string(),
        scopes: credential.scopes.clone(),
        expires_at: credential.expires_at,
        last_used_at: credential.last_used_at,
        updated_at: credential.updated_at,
    }
}

/// [`CredentialContract`] over the encrypted store.
#[derive(Clone)]
pub struct CredentialFacade {
    store: Arc<CredentialStore>,
}

impl CredentialFacade {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    async fn load(&self, user_id: Uuid, provider: &str) -> Result<Credential, ContractError> {
        self.store
            .get(user_id, provider)
            .await?
            .ok_or_else(|| {
                CredentialError::NotFound {
                    user_id,
                    provider: provider.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl CredentialContract for CredentialFacade {
    #[instrument(name = "CredentialContract.get_credential", skip(self))]
    async fn get_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<CredentialDto, ContractError> {
        Ok(to_dto(self.load(user_id, provider_identifier).await?))
    }

    #[instrument(name = "CredentialContract.none_credential", skip(self))]
    async fn none_credential(
        &self,
        _user_id: Uuid,
        _provider_identifier: &str,
    ) -> Result<CredentialDto, ContractError> {
        Ok(CredentialDto::None)
    }

    #[instrument(name = "CredentialContract.replace_oauth_token", skip(self, token))]
    async fn replace_oauth_token(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        token: &OAuthTokenDto,
    ) -> Result<(), ContractError> {
        self.store
            .replace_oauth_token(
                user_id,
                provider_identifier,
                token.access_token.clone(),
                token.refresh_token.clone(),
                token.scopes.clone(),
                token.expiry,
            )
            .await?;
        Ok(())
    }

    #[instrument(name = "CredentialContract.touch_last_used", skip(self))]
    async fn touch_last_used(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<(), ContractError> {
        self.store
            .touch_last_used(user_id, provider_identifier)
            .await?;
        Ok(())
    }

    #[instrument(name = "CredentialContract.store_credential", skip(self, credential))]
    async fn store_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        credential: CredentialDto,
    ) -> Result<CredentialSummaryDto, ContractError> {
        let (secret, scopes, expires_at) = match credential {
            CredentialDto::ApiKey { api_key } => (Secret::ApiKey { api_key }, Vec::new(), None),
            CredentialDto::Basic { username, password } => {
                (Secret::Basic { username, password }, Vec::new(), None)
            }
            CredentialDto::OAuth(token) => (
                Secret::OAuth {
                    access_token: token.access_token,
                    refresh_token: token.refresh_token,
                },
                token.scopes,
                token.expiry,
            ),
            CredentialDto::None => {
                return Err(ContractError::new(
                    ErrorKind::Validation,
                    "providers without authentication need no stored credential",
                ));
            }
        };
        let stored = self
            .store
            .upsert(user_id, provider_identifier, secret, scopes, expires_at)
            .await?;
        Ok(summary(&stored))
    }

    #[instrument(name = "CredentialContract.describe_credential", skip(self))]
    async fn describe_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<CredentialSummaryDto, ContractError> {
        Ok(summary(&self.load(user_id, provider_identifier).await?))
    }

    #[instrument(name = "CredentialContract.delete_credential", skip(self))]
    async fn delete_credential(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<(), ContractError> {
        self.store.delete(user_id, provider_identifier).await?;
        Ok(())
    }
}
