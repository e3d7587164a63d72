//! `manifest.json` wire format.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::adapters::mcp::MCP_TEMPLATE;
use crate::catalog::{AuthType, Operation, Parameter, Permission, Provider, ProviderStatus};
use crate::repositories::AdapterConfigs;

/// Credential blocks copied verbatim into the adapter's custom config.
const STATIC_CREDENTIAL_BLOCKS: [&str; 3] =
    ["api_key_config", "volcengine_credentials", "openai_credentials"];

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderManifest {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub auth_type: AuthType,
    #[serde(default)]
    pub status: ProviderStatus,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub operations: Vec<OperationManifest>,
    #[serde(default)]
    pub oauth_config: Option<Value>,
    /// Adapter template; defaults to `mcp` when an `mcp` block is present
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub mcp: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationManifest {
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub required_permissions: Vec<PermissionRef>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// Operations name their permissions either by identifier or by an object
/// carrying one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    Identifier(String),
    Object { identifier: String },
}

impl PermissionRef {
    pub fn identifier(&self) -> &str {
        match self {
            PermissionRef::Identifier(identifier) | PermissionRef::Object { identifier } => identifier,
        }
    }
}

impl ProviderManifest {
    /// Builds the provider aggregate with fresh ids. Required permissions
    /// that the provider does not declare are dropped.
    pub fn to_provider(&self) -> Provider {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let operations = self
            .operations
            .iter()
            .map(|operation| Operation {
                id: Uuid::new_v4(),
                identifier: operation.identifier.clone(),
                provider_id: id,
                name: if operation.name.is_empty() {
                    operation.identifier.clone()
                } else {
                    operation.name.clone()
                },
                description: operation.description.clone(),
                category: operation.category.clone(),
                required_permissions: self.resolve_permissions(operation),
                parameters: operation.parameters.clone(),
            })
            .collect();

        Provider {
            id,
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon_url: self.icon_url.clone().filter(|url| !url.is_empty()),
            auth_type: self.auth_type,
            status: self.status,
            categories: self.categories.iter().cloned().collect(),
            tags: self
                .tags
                .iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect::<BTreeSet<_>>(),
            permissions: self.permissions.clone(),
            operations,
            translations: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn resolve_permissions(&self, operation: &OperationManifest) -> Vec<Permission> {
        let mut seen = BTreeSet::new();
        operation
            .required_permissions
            .iter()
            .filter_map(|reference| {
                let found = self
                    .permissions
                    .iter()
                    .find(|p| p.identifier == reference.identifier());
                if found.is_none() {
                    tracing::debug!(
                        provider = %self.identifier,
                        operation = %operation.identifier,
                        permission = reference.identifier(),
                        "Dropping unknown required permission"
                    );
                }
                found
            })
            .filter(|permission| seen.insert(permission.identifier.clone()))
            .cloned()
            .collect()
    }

    /// Adapter configs derived from the manifest's credential and template
    /// blocks.
    pub fn adapter_configs(&self) -> AdapterConfigs {
        let mut custom = Map::new();
        let template = self
            .template
            .clone()
            .or_else(|| self.mcp.as_ref().map(|_| MCP_TEMPLATE.to_string()));
        if let Some(template) = template {
            custom.insert("template".to_string(), Value::String(template));
        }
        if let Some(mcp) = &self.mcp {
            custom.insert("mcp".to_string(), mcp.clone());
        }
        for block in STATIC_CREDENTIAL_BLOCKS {
            if let Some(value) = self.extra.get(block).filter(|v| !v.is_null()) {
                custom.insert(block.to_string(), value.clone());
            }
        }
        AdapterConfigs {
            oauth_config: self.oauth_config.clone().filter(|v| !v.is_null()),
            custom_config: custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> ProviderManifest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn drops_unknown_permissions() {
        let manifest = manifest(json!({
            "identifier": "github",
            "name": "GitHub",
            "auth_type": "oauth",
            "permissions": [{"identifier": "repo_read", "name": "Read", "oauth_scopes": ["repo"]}],
            "operations": [{
                "identifier": "list_repos",
                "required_permissions": ["repo_read", "admin", {"identifier": "repo_read"}],
                "parameters": [{"name": "org", "type": "string", "required": true}]
            }]
        }));
        let provider = manifest.to_provider();

        assert_eq!(provider.status, ProviderStatus::Active);
        let operation = provider.operation("list_repos").unwrap();
        assert_eq!(operation.provider_id, provider.id);
        assert_eq!(operation.name, "list_repos");
        assert_eq!(operation.required_permissions.len(), 1);
        assert_eq!(operation.required_permissions[0].identifier, "repo_read");
        assert!(provider.validate().is_ok());
    }

    #[test]
    fn mcp_block_selects_the_mcp_template() {
        let manifest = manifest(json!({
            "identifier": "search",
            "name": "Search",
            "auth_type": "apikey",
            "mcp": {"command": "npx", "args": ["-y", "search-mcp"]},
            "api_key_config": {"value": "sk-static"},
            "openai_credentials": null
        }));
        let configs = manifest.adapter_configs();

        assert_eq!(configs.custom_config["template"], "mcp");
        assert_eq!(configs.custom_config["mcp"]["command"], "npx");
        assert_eq!(configs.custom_config["api_key_config"]["value"], "sk-static");
        assert!(!configs.custom_config.contains_key("openai_credentials"));
        assert!(configs.oauth_config.is_none());
    }

    #[test]
    fn rejects_unknown_auth_type() {
        let result: Result<ProviderManifest, _> = serde_json::from_value(json!({
            "identifier": "x",
            "name": "X",
            "auth_type": "oauth2"
        }));
        assert!(result.is_err());
    }
}
