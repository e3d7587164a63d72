//! Provider aggregate and its nested value types.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::i18n::LanguageTag;

use super::translation::TranslatedProvider;

/// How callers authenticate against a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[serde(rename = "oauth")]
    OAuth,
    #[serde(rename = "apikey")]
    ApiKey,
    Basic,
    None,
}

impl AuthType {
    pub const ALL: [AuthType; 4] = [AuthType::OAuth, AuthType::ApiKey, AuthType::Basic, AuthType::None];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::OAuth => "oauth",
            AuthType::ApiKey => "apikey",
            AuthType::Basic => "basic",
            AuthType::None => "none",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oauth" => Ok(AuthType::OAuth),
            "apikey" => Ok(AuthType::ApiKey),
            "basic" => Ok(AuthType::Basic),
            "none" => Ok(AuthType::None),
            other => Err(format!("unknown auth type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
    Deprecated,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Active => "active",
            ProviderStatus::Inactive => "inactive",
            ProviderStatus::Maintenance => "maintenance",
            ProviderStatus::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProviderStatus::Active),
            "inactive" => Ok(ProviderStatus::Inactive),
            "maintenance" => Ok(ProviderStatus::Maintenance),
            "deprecated" => Ok(ProviderStatus::Deprecated),
            other => Err(format!("unknown provider status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A named bundle of OAuth scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub oauth_scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub identifier: String,
    pub provider_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub required_permissions: Vec<Permission>,
    pub parameters: Vec<Parameter>,
}

/// Provider aggregate: metadata, permissions, operations and the
/// translations resolved for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub icon_url: Option<String>,
    pub auth_type: AuthType,
    pub status: ProviderStatus,
    pub categories: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub permissions: Vec<Permission>,
    pub operations: Vec<Operation>,
    pub translations: BTreeMap<LanguageTag, TranslatedProvider>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderInvariantError {
    #[error("provider identifier must not be empty")]
    EmptyIdentifier,
    #[error("duplicate operation identifier '{0}'")]
    DuplicateOperation(String),
    #[error("duplicate permission identifier '{0}'")]
    DuplicatePermission(String),
    #[error("operation '{operation}' requires unknown permission '{permission}'")]
    UnknownPermission {
        operation: String,
        permission: String,
    },
}

impl Provider {
    pub fn operation(&self, identifier: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.identifier == identifier)
    }

    /// Checks identifier uniqueness and that every required permission is
    /// declared on the provider.
    pub fn validate(&self) -> Result<(), ProviderInvariantError> {
        if self.identifier.trim().is_empty() {
            return Err(ProviderInvariantError::EmptyIdentifier);
        }

        let mut permission_ids = BTreeSet::new();
        for permission in &self.permissions {
            if !permission_ids.insert(permission.identifier.as_str()) {
                return Err(ProviderInvariantError::DuplicatePermission(
                    permission.identifier.clone(),
                ));
            }
        }

        let mut operation_ids = BTreeSet::new();
        for operation in &self.operations {
            if !operation_ids.insert(operation.identifier.as_str()) {
                return Err(ProviderInvariantError::DuplicateOperation(
                    operation.identifier.clone(),
                ));
            }
            if let Some(missing) = operation
                .required_permissions
                .iter()
                .find(|p| !permission_ids.contains(p.identifier.as_str()))
            {
                return Err(ProviderInvariantError::UnknownPermission {
                    operation: operation.identifier.clone(),
                    permission: missing.identifier.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn permission(identifier: &str, scopes: &[&str]) -> Permission {
        Permission {
            identifier: identifier.to_string(),
            name: format!("{identifier} name"),
            description: format!("{identifier} description"),
            oauth_scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn operation(provider_id: Uuid, identifier: &str, permissions: Vec<Permission>) -> Operation {
        Operation {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            provider_id,
            name: format!("{identifier} name"),
            description: format!("{identifier} description"),
            category: "general".to_string(),
            required_permissions: permissions,
            parameters: vec![Parameter {
                name: "path".to_string(),
                param_type: ParameterType::String,
                description: "path description".to_string(),
                required: true,
                enum_values: None,
                default: None,
            }],
        }
    }

    pub fn provider(identifier: &str) -> Provider {
        let id = Uuid::new_v4();
        let read = permission("read", &["repo:read"]);
        Provider {
            id,
            identifier: identifier.to_string(),
            name: format!("{identifier} name"),
            description: format!("{identifier} description"),
            icon_url: None,
            auth_type: AuthType::OAuth,
            status: ProviderStatus::Active,
            categories: ["development".to_string()].into_iter().collect(),
            tags: BTreeSet::new(),
            permissions: vec![read.clone()],
            operations: vec![operation(id, "list_items", vec![read])],
            translations: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn auth_type_round_trips_wire_names() {
        for auth in AuthType::ALL {
            assert_eq!(auth.as_str().parse::<AuthType>().unwrap(), auth);
            assert_eq!(
                serde_json::to_value(auth).unwrap(),
                Value::String(auth.as_str().to_string())
            );
        }
        assert!("oauth2".parse::<AuthType>().is_err());
    }

    #[test]
    fn valid_provider_passes_invariants() {
        provider("github").validate().unwrap();
    }

    #[test]
    fn operation_requiring_undeclared_permission_is_rejected() {
        let mut provider = provider("github");
        provider.operations[0]
            .required_permissions
            .push(permission("admin", &["admin"]));

        assert_eq!(
            provider.validate(),
            Err(ProviderInvariantError::UnknownPermission {
                operation: "list_items".to_string(),
                permission: "admin".to_string(),
            })
        );
    }

    #[test]
    fn duplicate_operations_are_rejected() {
        let mut provider = provider("github");
        let duplicate = provider.operations[0].clone();
        provider.operations.push(duplicate);

        assert!(matches!(
            provider.validate(),
            Err(ProviderInvariantError::DuplicateOperation(_))
        ));
    }
}
