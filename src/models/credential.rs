//! Credential entity model
//!
//! Secret material is only ever present as ciphertext; the AAD binding is
//! `user_id|provider_identifier`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub provider_identifier: String,

    /// apikey | oauth | basic
    pub kind: String,

    pub secret_ciphertext: Vec<u8>,

    /// Granted OAuth scopes as a JSON array
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: Option<JsonValue>,

    pub expires_at: Option<DateTimeWithTimeZone>,

    pub last_used_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
