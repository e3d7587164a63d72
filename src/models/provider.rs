//! Provider entity model
//!
//! Catalog row for an external provider. Categories, permissions and tags are
//! kept in `json_attributes`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human slug, unique across the catalog
    pub identifier: String,

    pub name: String,

    pub description: String,

    /// One of oauth, apikey, basic, none
    pub auth_type: String,

    /// One of active, inactive, maintenance, deprecated
    pub status: String,

    pub icon_url: Option<String>,

    /// `{categories, permissions, tags}`
    #[sea_orm(column_type = "JsonBinary")]
    pub json_attributes: JsonValue,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    /// Soft-delete marker
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::operation::Entity")]
    Operations,
}

impl Related<super::operation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
