//! Adapter configuration source
//!
//! Joins the `provider_adapters` rows with their live providers to produce
//! the [`ProviderAdapterConfig`] the adapter factory builds from.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::adapters::ProviderAdapterConfig;
use crate::catalog::AuthType;
use crate::models::provider::{self, Entity as ProviderEntity};
use crate::models::provider_adapter::{self, Entity as ProviderAdapterEntity};

/// Stored form of the `configs` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfigs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom_config: Map<String, Value>,
}

#[async_trait]
pub trait AdapterConfigSource: Send + Sync {
    async fn get(&self, identifier: &str) -> Result<Option<ProviderAdapterConfig>>;
    async fn list(&self) -> Result<Vec<ProviderAdapterConfig>>;
}

fn combine(provider: provider::Model, row: provider_adapter::Model) -> Result<ProviderAdapterConfig> {
    let configs: AdapterConfigs = serde_json::from_value(row.configs).unwrap_or_else(|error| {
        tracing::warn!(provider = %row.identifier, %error, "Ignoring malformed adapter configs");
        AdapterConfigs::default()
    });
    let auth_type = provider.auth_type.parse::<AuthType>().map_err(|e| anyhow!(e))?;
    Ok(ProviderAdapterConfig {
        id: provider.id,
        identifier: provider.identifier,
        name: provider.name,
        description: provider.description,
        auth_type,
        oauth_config: configs.oauth_config,
        custom_config: configs.custom_config,
    })
}

#[derive(Debug, Clone)]
pub struct DbAdapterConfigRepository {
    pub db: Arc<DatabaseConnection>,
}

impl DbAdapterConfigRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Writes the adapter configs for a provider identifier.
    pub async fn upsert(&self, identifier: &str, configs: &AdapterConfigs) -> Result<()> {
        let now = Utc::now();
        let value = serde_json::to_value(configs)?;
        let existing = ProviderAdapterEntity::find()
            .filter(provider_adapter::Column::Identifier.eq(identifier))
            .one(&*self.db)
            .await?;

        match existing {
            Some(row) => {
                let mut model: provider_adapter::ActiveModel = row.into();
                model.configs = Set(value);
                model.updated_at = Set(now.into());
                model.update(&*self.db).await?;
            }
            None => {
                let model = provider_adapter::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    identifier: Set(identifier.to_string()),
                    configs: Set(value),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                ProviderAdapterEntity::insert(model).exec(&*self.db).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AdapterConfigSource for DbAdapterConfigRepository {
    async fn get(&self, identifier: &str) -> Result<Option<ProviderAdapterConfig>> {
        let Some(row) = ProviderAdapterEntity::find()
            .filter(provider_adapter::Column::Identifier.eq(identifier))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };
        let Some(provider) = ProviderEntity::find()
            .filter(provider::Column::Identifier.eq(identifier))
            .filter(provider::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };
        combine(provider, row).map(Some)
    }

    async fn list(&self) -> Result<Vec<ProviderAdapterConfig>> {
        let mut providers: HashMap<String, provider::Model> = ProviderEntity::find()
            .filter(provider::Column::DeletedAt.is_null())
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.identifier.clone(), p))
            .collect();

        let rows = ProviderAdapterEntity::find()
            .order_by_asc(provider_adapter::Column::Identifier)
            .all(&*self.db)
            .await?;

        rows.into_iter()
            .filter_map(|row| providers.remove(&row.identifier).map(|p| (p, row)))
            .map(|(provider, row)| combine(provider, row))
            .collect()
    }
}
