//! Operation repository
//!
//! Operations are always written as a full set per provider so that the
//! stored order matches the manifest order.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{Operation, Parameter, Permission};
use crate::models::operation::{self, Entity as OperationEntity};

#[async_trait]
pub trait OperationRepository: Send + Sync {
    async fn list_for_provider(&self, provider_id: Uuid) -> Result<Vec<Operation>>;
    /// Replaces every operation of the provider atomically.
    async fn replace_for_provider(&self, provider_id: Uuid, operations: &[Operation]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OperationAttributes {
    #[serde(default)]
    required_permissions: Vec<Permission>,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

fn to_domain(model: operation::Model) -> Result<Operation> {
    let attributes: OperationAttributes = serde_json::from_value(model.json_attributes)
        .with_context(|| format!("operation '{}' has malformed json_attributes", model.identifier))?;
    Ok(Operation {
        id: model.id,
        identifier: model.identifier,
        provider_id: model.provider_id,
        name: model.name,
        description: model.description,
        category: model.category,
        required_permissions: attributes.required_permissions,
        parameters: attributes.parameters,
    })
}

#[derive(Debug, Clone)]
pub struct DbOperationRepository {
    pub db: Arc<DatabaseConnection>,
}

impl DbOperationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OperationRepository for DbOperationRepository {
    async fn list_for_provider(&self, provider_id: Uuid) -> Result<Vec<Operation>> {
        OperationEntity::find()
            .filter(operation::Column::ProviderId.eq(provider_id))
            .order_by_asc(operation::Column::Position)
            .order_by_asc(operation::Column::Identifier)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn replace_for_provider(&self, provider_id: Uuid, operations: &[Operation]) -> Result<()> {
        let txn = self.db.begin().await?;

        OperationEntity::delete_many()
            .filter(operation::Column::ProviderId.eq(provider_id))
            .exec(&txn)
            .await?;

        if !operations.is_empty() {
            let now = Utc::now();
            let mut models = Vec::with_capacity(operations.len());
            for (position, op) in operations.iter().enumerate() {
                let attributes = OperationAttributes {
                    required_permissions: op.required_permissions.clone(),
                    parameters: op.parameters.clone(),
                };
                models.push(operation::ActiveModel {
                    id: Set(op.id),
                    identifier: Set(op.identifier.clone()),
                    provider_id: Set(provider_id),
                    name: Set(op.name.clone()),
                    description: Set(op.description.clone()),
                    category: Set(op.category.clone()),
                    json_attributes: Set(serde_json::to_value(attributes)?),
                    position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                });
            }
            OperationEntity::insert_many(models).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }
}
