use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{CryptoKey, credential_aad, decrypt_bytes, encrypt_bytes};
use crate::repositories::{CredentialRecord, CredentialRepository, SecretUpdate};

use super::CredentialError;

/// Secret material of a stored credential. Serialized only into the
/// encrypted column.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Secret {
    #[serde(rename = "apikey")]
    ApiKey { api_key: String },
    #[serde(rename = "oauth")]
    OAuth {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
    },
    Basic { username: String, password: String },
}

impl Secret {
    pub fn kind(&self) -> &'static str {
        match self {
            Secret::ApiKey { .. } => "apikey",
            Secret::OAuth { .. } => "oauth",
            Secret::Basic { .. } => "basic",
        }
    }

    fn validate(&self) -> Result<(), CredentialError> {
        let empty = match self {
            Secret::ApiKey { api_key } => api_key.trim().is_empty(),
            Secret::OAuth { access_token, .. } => access_token.trim().is_empty(),
            Secret::Basic { username, .. } => username.trim().is_empty(),
        };
        if empty {
            return Err(CredentialError::Invalid(format!(
                "{} credential is missing its secret",
                self.kind()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret::{}([REDACTED])", self.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: Uuid,
    pub provider_identifier: String,
    pub secret: Secret,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Encrypting store over a [`CredentialRepository`].
pub struct CredentialStore {
    repository: Arc<dyn CredentialRepository>,
    key: CryptoKey,
}

impl CredentialStore {
    pub fn new(repository: Arc<dyn CredentialRepository>, key: CryptoKey) -> Self {
        Self { repository, key }
    }

    fn seal(&self, user_id: Uuid, provider: &str, secret: &Secret) -> Result<Vec<u8>, CredentialError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(secret).map_err(CredentialError::Corrupt)?);
        Ok(encrypt_bytes(
            &self.key,
            &credential_aad(user_id, provider),
            &plaintext,
        )?)
    }

    fn open(&self, record: CredentialRecord) -> Result<Credential, CredentialError> {
        let aad = credential_aad(record.user_id, &record.provider_identifier);
        let plaintext = Zeroizing::new(decrypt_bytes(&self.key, &aad, &record.secret_ciphertext)?);
        let secret: Secret = serde_json::from_slice(&plaintext).map_err(CredentialError::Corrupt)?;
        Ok(Credential {
            user_id: record.user_id,
            provider_identifier: record.provider_identifier,
            secret,
            scopes: record.scopes,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
            updated_at: record.updated_at,
        })
    }

    pub async fn get(&self, user_id: Uuid, provider: &str) -> Result<Option<Credential>, CredentialError> {
        let Some(record) = self
            .repository
            .find(user_id, provider)
            .await
            .map_err(CredentialError::Repository)?
        else {
            return Ok(None);
        };
        self.open(record).map(Some)
    }

    pub async fn upsert(
        &self,
        user_id: Uuid,
        provider: &str,
        secret: Secret,
        scopes: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Credential, CredentialError> {
        secret.validate()?;
        let now = Utc::now();
        let mut scopes = scopes;
        scopes.sort();
        scopes.dedup();

        let record = CredentialRecord {
            id: Uuid::new_v4(),
            user_id,
            provider_identifier: provider.to_string(),
            kind: secret.kind().to_string(),
            secret_ciphertext: self.seal(user_id, provider, &secret)?,
            scopes: scopes.clone(),
            expires_at,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };
        self.repository
            .upsert(&record)
            .await
            .map_err(CredentialError::Repository)?;

        tracing::info!(%user_id, provider, kind = secret.kind(), "Stored credential");
        Ok(Credential {
            user_id,
            provider_identifier: provider.to_string(),
            secret,
            scopes,
            expires_at,
            last_used_at: None,
            updated_at: now,
        })
    }

    /// Swaps the sealed OAuth token in one statement.
    pub async fn replace_oauth_token(
        &self,
        user_id: Uuid,
        provider: &str,
        access_token: String,
        refresh_token: Option<String>,
        scopes: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CredentialError> {
        let secret = Secret::OAuth {
            access_token,
            refresh_token,
        };
        secret.validate()?;
        let update = SecretUpdate {
            secret_ciphertext: self.seal(user_id, provider, &secret)?,
            scopes,
            expires_at,
        };
        let updated = self
            .repository
            .update_secret(user_id, provider, &update)
            .await
            .map_err(CredentialError::Repository)?;
        if !updated {
            return Err(CredentialError::NotFound {
                user_id,
                provider: provider.to_string(),
            });
        }
        Ok(())
    }

    pub async fn touch_last_used(&self, user_id: Uuid, provider: &str) -> Result<(), CredentialError> {
        self.repository
            .touch_last_used(user_id, provider, Utc::now())
            .await
            .map_err(CredentialError::Repository)?;
        Ok(())
    }

    pub async fn delete(&self, user_id: Uuid, provider: &str) -> Result<(), CredentialError> {
        let deleted = self
            .repository
            .delete(user_id, provider)
            .await
            .map_err(CredentialError::Repository)?;
        if !deleted {
            return Err(CredentialError::NotFound {
                user_id,
                provider: provider.to_string(),
            });
        }
        Ok(())
    }
}
