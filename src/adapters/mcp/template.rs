use std::sync::Arc;
use std::time::Duration;

use super::adapter::McpAdapter;
use super::client::McpConnector;
use super::config::{parse, static_credentials};
use crate::adapters::registry::{AdapterTemplate, BuiltAdapter, oauth_helper};
use crate::adapters::{AdapterError, AdapterInfo, ProviderAdapterConfig};

pub const MCP_TEMPLATE: &str = "mcp";

/// Builds [`McpAdapter`]s from the `mcp` block of a provider's custom config.
pub struct McpTemplate {
    connector: Arc<dyn McpConnector>,
    default_timeout: Duration,
    expiry_skew: Duration,
}

impl McpTemplate {
    pub fn new(connector: Arc<dyn McpConnector>, default_timeout: Duration, expiry_skew: Duration) -> Self {
        Self {
            connector,
            default_timeout,
            expiry_skew,
        }
    }
}

impl AdapterTemplate for McpTemplate {
    fn identifier(&self) -> &'static str {
        MCP_TEMPLATE
    }

    fn validate_config(&self, config: &ProviderAdapterConfig) -> Result<(), AdapterError> {
        let (_, mappings) = parse(&config.identifier, &config.custom_config, self.default_timeout)?;
        for name in mappings.dummy_credentials.keys() {
            if !mappings.credential_mappings.contains_key(name) {
                return Err(AdapterError::invalid_config(
                    &config.identifier,
                    format!("dummy credential '{name}' has no credential mapping"),
                ));
            }
        }
        Ok(())
    }

    fn create_adapter(&self, config: &ProviderAdapterConfig) -> Result<BuiltAdapter, AdapterError> {
        let (launch, mappings) = parse(&config.identifier, &config.custom_config, self.default_timeout)?;
        let adapter = McpAdapter::new(
            AdapterInfo {
                identifier: config.identifier.clone(),
                name: config.name.clone(),
                description: config.description.clone(),
                auth_type: config.auth_type,
                template: MCP_TEMPLATE.to_string(),
            },
            launch,
            mappings,
            static_credentials(&config.custom_config),
            self.connector.clone(),
        );
        Ok(BuiltAdapter {
            adapter: Arc::new(adapter),
            oauth: oauth_helper(config, self.expiry_skew)?,
        })
    }
}
