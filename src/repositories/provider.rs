//! Provider repository for database operations
//!
//! Persists the provider aggregate minus its operations (see
//! [`OperationRepository`](super::OperationRepository)) and translations.
//! Categories, permissions and tags live in `json_attributes`.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{AuthType, Permission, Provider, ProviderStatus};
use crate::models::provider::{self, Entity as ProviderEntity};

/// SQL-level filter; name, tag and paging are applied by the catalog.
#[derive(Debug, Clone, Default)]
pub struct ProviderFilter {
    pub status: Option<ProviderStatus>,
    pub auth_type: Option<AuthType>,
    /// Leaves deprecated providers out.
    pub listed_only: bool,
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Provider>>;
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Provider>>;
    async fn list(&self, filter: &ProviderFilter) -> Result<Vec<Provider>>;
    async fn insert(&self, provider: &Provider) -> Result<()>;
    async fn update(&self, provider: &Provider) -> Result<()>;
    /// Marks the provider deleted. Returns false when no live row matched.
    async fn soft_delete(&self, id: Uuid) -> Result<bool>;
    async fn set_tags(&self, id: Uuid, tags: &BTreeSet<String>) -> Result<bool>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProviderAttributes {
    #[serde(default)]
    categories: BTreeSet<String>,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    tags: BTreeSet<String>,
}

fn attributes_of(provider: &Provider) -> Result<serde_json::Value> {
    let attributes = ProviderAttributes {
        categories: provider.categories.clone(),
        permissions: provider.permissions.clone(),
        tags: provider.tags.clone(),
    };
    Ok(serde_json::to_value(attributes)?)
}

fn to_domain(model: provider::Model) -> Result<Provider> {
    let attributes: ProviderAttributes = serde_json::from_value(model.json_attributes)
        .with_context(|| format!("provider '{}' has malformed json_attributes", model.identifier))?;
    let auth_type = model.auth_type.parse::<AuthType>().map_err(|e| anyhow!(e))?;
    let status = model.status.parse::<ProviderStatus>().map_err(|e| anyhow!(e))?;

    Ok(Provider {
        id: model.id,
        identifier: model.identifier,
        name: model.name,
        description: model.description,
        icon_url: model.icon_url,
        auth_type,
        status,
        categories: attributes.categories,
        tags: attributes.tags,
        permissions: attributes.permissions,
        operations: Vec::new(),
        translations: Default::default(),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

/// SeaORM backed [`ProviderRepository`]
#[derive(Debug, Clone)]
pub struct DbProviderRepository {
    pub db: Arc<DatabaseConnection>,
}

impl DbProviderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProviderRepository for DbProviderRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Provider>> {
        ProviderEntity::find_by_id(id)
            .filter(provider::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Provider>> {
        ProviderEntity::find()
            .filter(provider::Column::Identifier.eq(identifier))
            .filter(provider::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn list(&self, filter: &ProviderFilter) -> Result<Vec<Provider>> {
        let mut query = ProviderEntity::find().filter(provider::Column::DeletedAt.is_null());
        if let Some(status) = filter.status {
            query = query.filter(provider::Column::Status.eq(status.as_str()));
        }
        if let Some(auth_type) = filter.auth_type {
            query = query.filter(provider::Column::AuthType.eq(auth_type.as_str()));
        }
        if filter.listed_only {
            query = query.filter(provider::Column::Status.ne(ProviderStatus::Deprecated.as_str()));
        }

        query
            .order_by_asc(provider::Column::Identifier)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn insert(&self, provider: &Provider) -> Result<()> {
        let model = provider::ActiveModel {
            id: Set(provider.id),
            identifier: Set(provider.identifier.clone()),
            name: Set(provider.name.clone()),
            description: Set(provider.description.clone()),
            auth_type: Set(provider.auth_type.as_str().to_string()),
            status: Set(provider.status.as_str().to_string()),
            icon_url: Set(provider.icon_url.clone()),
            json_attributes: Set(attributes_of(provider)?),
            created_at: Set(provider.created_at.into()),
            updated_at: Set(provider.updated_at.into()),
            deleted_at: Set(None),
        };
        ProviderEntity::insert(model).exec(&*self.db).await?;
        Ok(())
    }

    async fn update(&self, provider: &Provider) -> Result<()> {
        let existing = ProviderEntity::find_by_id(provider.id)
            .filter(provider::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Provider '{}' not found", provider.identifier))?;

        let mut model: provider::ActiveModel = existing.into();
        model.identifier = Set(provider.identifier.clone());
        model.name = Set(provider.name.clone());
        model.description = Set(provider.description.clone());
        model.auth_type = Set(provider.auth_type.as_str().to_string());
        model.status = Set(provider.status.as_str().to_string());
        model.icon_url = Set(provider.icon_url.clone());
        model.json_attributes = Set(attributes_of(provider)?);
        model.updated_at = Set(provider.updated_at.into());
        model.update(&*self.db).await?;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let result = ProviderEntity::update_many()
            .col_expr(provider::Column::DeletedAt, Expr::value(now))
            .col_expr(provider::Column::UpdatedAt, Expr::value(now))
            .filter(provider::Column::Id.eq(id))
            .filter(provider::Column::DeletedAt.is_null())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn set_tags(&self, id: Uuid, tags: &BTreeSet<String>) -> Result<bool> {
        let Some(existing) = ProviderEntity::find_by_id(id)
            .filter(provider::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
        else {
            return Ok(false);
        };

        let mut attributes: ProviderAttributes =
            serde_json::from_value(existing.json_attributes.clone()).with_context(|| {
                format!("provider '{}' has malformed json_attributes", existing.identifier)
            })?;
        attributes.tags = tags.clone();

        let mut model: provider::ActiveModel = existing.into();
        model.json_attributes = Set(serde_json::to_value(attributes)?);
        model.updated_at = Set(Utc::now().into());
        model.update(&*self.db).await?;
        Ok(true)
    }
}
