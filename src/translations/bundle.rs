//! Decoded form of a provider i18n file.
//!
//! Identifiers and parameter names are keys, never translated values.

use serde::{Deserialize, Serialize};

use super::TranslationError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionTranslation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationTranslation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTranslation {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTranslation {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterTranslation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterTranslation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TranslationBundle {
    pub fn decode(raw: &str) -> Result<Self, TranslationError> {
        serde_json::from_str(raw).map_err(TranslationError::Decode)
    }

    pub fn permission(&self, identifier: &str) -> Option<&PermissionTranslation> {
        self.permissions.iter().find(|p| p.identifier == identifier)
    }

    pub fn operation(&self, identifier: &str) -> Option<&OperationTranslation> {
        self.operations.iter().find(|op| op.identifier == identifier)
    }
}

impl OperationTranslation {
    pub fn parameter(&self, name: &str) -> Option<&ParameterTranslation> {
        self.parameters.iter().find(|p| p.name == name)
    }
}
