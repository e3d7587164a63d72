//! Invocation entity model
//!
//! One row per user call against a provider operation.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "invocations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub provider_identifier: String,

    pub operation_identifier: String,

    /// pending | success | failed
    pub status: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub parameters: JsonValue,

    /// Compact JSON bytes of the adapter result
    pub response_data: Option<Vec<u8>>,

    pub error_message: Option<String>,

    pub started_at: DateTimeWithTimeZone,

    pub completed_at: Option<DateTimeWithTimeZone>,

    pub duration_ms: Option<i64>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
