//! Plain data records exchanged across module boundaries.
//!
//! DTOs carry no behavior beyond validation of their own shape.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ErrorKind;

use super::ContractError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionDto {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub oauth_scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParameterDto {
    pub name: String,
    /// One of string, integer, number, boolean, object, array
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    pub required: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OperationDto {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub category: String,
    /// Identifiers of the permissions the operation needs
    pub required_permissions: Vec<String>,
    /// Union of the OAuth scopes of those permissions
    pub required_scopes: Vec<String>,
    pub parameters: Vec<ParameterDto>,
}

/// Brief provider form used by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderSummaryDto {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub icon_url: Option<String>,
    pub auth_type: String,
    pub status: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub api_doc_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderDto {
    #[serde(flatten)]
    pub summary: ProviderSummaryDto,
    /// Language the display strings are in
    pub language: String,
    pub permissions: Vec<PermissionDto>,
    pub operations: Vec<OperationDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderPageDto {
    pub items: Vec<ProviderSummaryDto>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Provider listing request. String fields are validated by
/// [`ProviderListQuery::validate`] before any storage access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderListQuery {
    pub status: Option<String>,
    pub include_inactive: bool,
    pub auth_type: Option<String>,
    pub tag: Option<String>,
    pub name: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

pub const AUTH_TYPES: [&str; 4] = ["oauth", "apikey", "basic", "none"];
pub const SORT_FIELDS: [&str; 4] = ["created_at", "updated_at", "name", "identifier"];
pub const SORT_ORDERS: [&str; 2] = ["asc", "desc"];

impl ProviderListQuery {
    pub fn validate(&self) -> Result<(), ContractError> {
        let checks = [
            ("auth_type", self.auth_type.as_deref(), &AUTH_TYPES[..]),
            ("sort.field", self.sort_field.as_deref(), &SORT_FIELDS[..]),
            ("sort.order", self.sort_order.as_deref(), &SORT_ORDERS[..]),
        ];
        for (field, value, allowed) in checks {
            if let Some(value) = value
                && !allowed.contains(&value)
            {
                return Err(ContractError::new(
                    ErrorKind::Validation,
                    format!("{field} must be one of {}", allowed.join(", ")),
                ));
            }
        }
        if self.page == Some(0) {
            return Err(ContractError::new(ErrorKind::Validation, "page starts at 1"));
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokenDto {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for OAuthTokenDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenDto")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Resolved caller credential for one provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialDto {
    #[serde(rename = "apikey")]
    ApiKey { api_key: String },
    #[serde(rename = "oauth")]
    OAuth(OAuthTokenDto),
    Basic { username: String, password: String },
    None,
}

impl CredentialDto {
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialDto::ApiKey { .. } => "apikey",
            CredentialDto::OAuth(_) => "oauth",
            CredentialDto::Basic { .. } => "basic",
            CredentialDto::None => "none",
        }
    }
}

impl fmt::Debug for CredentialDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialDto::OAuth(token) => f.debug_tuple("OAuth").field(token).finish(),
            other => write!(f, "{}([REDACTED])", other.kind()),
        }
    }
}

/// Stored credential metadata. Never carries secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CredentialSummaryDto {
    pub provider_identifier: String,
    pub kind: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdapterInfoDto {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub auth_type: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdapterStatusDto {
    pub identifier: String,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
