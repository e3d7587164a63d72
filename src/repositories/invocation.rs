//! Invocation repository
//!
//! Rows are inserted once as `pending` and completed with a conditional
//! update, so a terminal state can never be overwritten.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::invocations::{Invocation, InvocationStatus};
use crate::models::invocation::{self, Entity as InvocationEntity};

#[async_trait]
pub trait InvocationRepository: Send + Sync {
    async fn create(&self, invocation: &Invocation) -> Result<()>;
    /// Persists the terminal state; fails when the row is no longer pending.
    async fn complete(&self, invocation: &Invocation) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Invocation>>;
    /// Newest first. Returns the page and the total row count for the user.
    async fn list_by_user(&self, user_id: Uuid, limit: u64, offset: u64)
    -> Result<(Vec<Invocation>, u64)>;
}

fn to_domain(model: invocation::Model) -> Result<Invocation> {
    Ok(Invocation {
        id: model.id,
        user_id: model.user_id,
        provider_identifier: model.provider_identifier,
        operation_identifier: model.operation_identifier,
        status: model.status.parse().map_err(|e: String| anyhow!(e))?,
        parameters: model.parameters,
        response_data: model.response_data,
        error_message: model.error_message,
        started_at: model.started_at.with_timezone(&Utc),
        completed_at: model.completed_at.map(|at| at.with_timezone(&Utc)),
        duration_ms: model.duration_ms,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn fixed(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.into()
}

#[derive(Debug, Clone)]
pub struct DbInvocationRepository {
    pub db: Arc<DatabaseConnection>,
}

impl DbInvocationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InvocationRepository for DbInvocationRepository {
    async fn create(&self, invocation: &Invocation) -> Result<()> {
        if invocation.status != InvocationStatus::Pending {
            bail!("invocation {} must be created as pending", invocation.id);
        }
        let model = invocation::ActiveModel {
            id: Set(invocation.id),
            user_id: Set(invocation.user_id),
            provider_identifier: Set(invocation.provider_identifier.clone()),
            operation_identifier: Set(invocation.operation_identifier.clone()),
            status: Set(invocation.status.as_str().to_string()),
            parameters: Set(invocation.parameters.clone()),
            response_data: Set(None),
            error_message: Set(None),
            started_at: Set(fixed(invocation.started_at)),
            completed_at: Set(None),
            duration_ms: Set(None),
            created_at: Set(fixed(invocation.created_at)),
            updated_at: Set(fixed(invocation.updated_at)),
        };
        InvocationEntity::insert(model).exec(&*self.db).await?;
        Ok(())
    }

    async fn complete(&self, invocation: &Invocation) -> Result<()> {
        let Some(completed_at) = invocation.completed_at else {
            bail!("invocation {} has no completion time", invocation.id);
        };

        let result = InvocationEntity::update_many()
            .col_expr(
                invocation::Column::Status,
                Expr::value(invocation.status.as_str()),
            )
            .col_expr(
                invocation::Column::ResponseData,
                Expr::value(invocation.response_data.clone()),
            )
            .col_expr(
                invocation::Column::ErrorMessage,
                Expr::value(invocation.error_message.clone()),
            )
            .col_expr(invocation::Column::CompletedAt, Expr::value(fixed(completed_at)))
            .col_expr(invocation::Column::DurationMs, Expr::value(invocation.duration_ms))
            .col_expr(
                invocation::Column::UpdatedAt,
                Expr::value(fixed(invocation.updated_at)),
            )
            .filter(invocation::Column::Id.eq(invocation.id))
            .filter(invocation::Column::Status.eq(InvocationStatus::Pending.as_str()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            bail!("invocation {} is not pending", invocation.id);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Invocation>> {
        InvocationEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Invocation>, u64)> {
        let base = InvocationEntity::find().filter(invocation::Column::UserId.eq(user_id));
        let total = base.clone().count(&*self.db).await?;

        let rows = base
            .order_by_desc(invocation::Column::CreatedAt)
            .order_by_desc(invocation::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(to_domain)
            .collect::<Result<Vec<_>>>()?;

        Ok((rows, total))
    }
}
