//! Credential repository
//!
//! Stores sealed secrets only; encryption happens in the credential store.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::credential::{self, Entity as CredentialEntity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_identifier: String,
    pub kind: String,
    pub secret_ciphertext: Vec<u8>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<credential::Model> for CredentialRecord {
    fn from(model: credential::Model) -> Self {
        let scopes = model
            .scopes
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        Self {
            id: model.id,
            user_id: model.user_id,
            provider_identifier: model.provider_identifier,
            kind: model.kind,
            secret_ciphertext: model.secret_ciphertext,
            scopes,
            expires_at: model.expires_at.map(|at| at.with_timezone(&Utc)),
            last_used_at: model.last_used_at.map(|at| at.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Replacement secret for an existing credential row.
#[derive(Debug, Clone)]
pub struct SecretUpdate {
    pub secret_ciphertext: Vec<u8>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn find(&self, user_id: Uuid, provider_identifier: &str) -> Result<Option<CredentialRecord>>;
    /// Inserts or replaces the credential for `(user, provider)`.
    async fn upsert(&self, record: &CredentialRecord) -> Result<()>;
    /// Replaces the secret of an existing row in a single statement.
    async fn update_secret(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        update: &SecretUpdate,
    ) -> Result<bool>;
    async fn touch_last_used(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn delete(&self, user_id: Uuid, provider_identifier: &str) -> Result<bool>;
}

fn fixed(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.into()
}

#[derive(Debug, Clone)]
pub struct DbCredentialRepository {
    pub db: Arc<DatabaseConnection>,
}

impl DbCredentialRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_model(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
    ) -> Result<Option<credential::Model>> {
        Ok(CredentialEntity::find()
            .filter(credential::Column::UserId.eq(user_id))
            .filter(credential::Column::ProviderIdentifier.eq(provider_identifier))
            .one(&*self.db)
            .await?)
    }
}

#[async_trait]
impl CredentialRepository for DbCredentialRepository {
    async fn find(&self, user_id: Uuid, provider_identifier: &str) -> Result<Option<CredentialRecord>> {
        Ok(self
            .find_model(user_id, provider_identifier)
            .await?
            .map(CredentialRecord::from))
    }

    async fn upsert(&self, record: &CredentialRecord) -> Result<()> {
        let scopes = serde_json::to_value(&record.scopes)?;
        match self
            .find_model(record.user_id, &record.provider_identifier)
            .await?
        {
            Some(existing) => {
                let mut model: credential::ActiveModel = existing.into();
                model.kind = Set(record.kind.clone());
                model.secret_ciphertext = Set(record.secret_ciphertext.clone());
                model.scopes = Set(Some(scopes));
                model.expires_at = Set(record.expires_at.map(fixed));
                model.updated_at = Set(fixed(record.updated_at));
                model.update(&*self.db).await?;
            }
            None => {
                let model = credential::ActiveModel {
                    id: Set(record.id),
                    user_id: Set(record.user_id),
                    provider_identifier: Set(record.provider_identifier.clone()),
                    kind: Set(record.kind.clone()),
                    secret_ciphertext: Set(record.secret_ciphertext.clone()),
                    scopes: Set(Some(scopes)),
                    expires_at: Set(record.expires_at.map(fixed)),
                    last_used_at: Set(record.last_used_at.map(fixed)),
                    created_at: Set(fixed(record.created_at)),
                    updated_at: Set(fixed(record.updated_at)),
                };
                CredentialEntity::insert(model).exec(&*self.db).await?;
            }
        }
        Ok(())
    }

    async fn update_secret(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        update: &SecretUpdate,
    ) -> Result<bool> {
        let scopes = serde_json::to_value(&update.scopes)?;
        let result = CredentialEntity::update_many()
            .col_expr(
                credential::Column::SecretCiphertext,
                Expr::value(update.secret_ciphertext.clone()),
            )
            .col_expr(credential::Column::Scopes, Expr::value(scopes))
            .col_expr(
                credential::Column::ExpiresAt,
                Expr::value(update.expires_at.map(fixed)),
            )
            .col_expr(credential::Column::UpdatedAt, Expr::value(fixed(Utc::now())))
            .filter(credential::Column::UserId.eq(user_id))
            .filter(credential::Column::ProviderIdentifier.eq(provider_identifier))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn touch_last_used(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = CredentialEntity::update_many()
            .col_expr(credential::Column::LastUsedAt, Expr::value(fixed(at)))
            .filter(credential::Column::UserId.eq(user_id))
            .filter(credential::Column::ProviderIdentifier.eq(provider_identifier))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn delete(&self, user_id: Uuid, provider_identifier: &str) -> Result<bool> {
        let result = CredentialEntity::delete_many()
            .filter(credential::Column::UserId.eq(user_id))
            .filter(credential::Column::ProviderIdentifier.eq(provider_identifier))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
