//! Translation repository
//!
//! Rows are keyed by `(provider_identifier, language_code)` and hold the
//! compact JSON text of a translation bundle.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::provider_translation::{self, Entity as TranslationEntity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRecord {
    pub provider_identifier: String,
    pub language_code: String,
    pub translations: String,
    pub updated_at: DateTime<Utc>,
}

impl From<provider_translation::Model> for TranslationRecord {
    fn from(model: provider_translation::Model) -> Self {
        Self {
            provider_identifier: model.provider_identifier,
            language_code: model.language_code,
            translations: model.translations,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[async_trait]
pub trait TranslationRepository: Send + Sync {
    async fn find(&self, identifier: &str, language_code: &str) -> Result<Option<TranslationRecord>>;
    async fn upsert(&self, identifier: &str, language_code: &str, payload: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct DbTranslationRepository {
    pub db: Arc<DatabaseConnection>,
}

impl DbTranslationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_model(
        &self,
        identifier: &str,
        language_code: &str,
    ) -> Result<Option<provider_translation::Model>> {
        Ok(TranslationEntity::find()
            .filter(provider_translation::Column::ProviderIdentifier.eq(identifier))
            .filter(provider_translation::Column::LanguageCode.eq(language_code))
            .one(&*self.db)
            .await?)
    }
}

#[async_trait]
impl TranslationRepository for DbTranslationRepository {
    async fn find(&self, identifier: &str, language_code: &str) -> Result<Option<TranslationRecord>> {
        Ok(self
            .find_model(identifier, language_code)
            .await?
            .map(TranslationRecord::from))
    }

    async fn upsert(&self, identifier: &str, language_code: &str, payload: &str) -> Result<()> {
        let now = Utc::now();
        match self.find_model(identifier, language_code).await? {
            Some(existing) => {
                let mut model: provider_translation::ActiveModel = existing.into();
                model.translations = Set(payload.to_string());
                model.updated_at = Set(now.into());
                model.update(&*self.db).await?;
            }
            None => {
                let model = provider_translation::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    provider_identifier: Set(identifier.to_string()),
                    language_code: Set(language_code.to_string()),
                    translations: Set(payload.to_string()),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                TranslationEntity::insert(model).exec(&*self.db).await?;
            }
        }
        Ok(())
    }
}
