use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::McpError;
use super::client::{McpConnector, McpTool, ToolCallOutput};
use super::config::{McpAdapterConfig, McpClientConfig};
use super::schema::ToolSchema;
use crate::adapters::{Adapter, AdapterError, AdapterInfo, AdapterOperation};
use crate::catalog::AuthType;
use crate::contracts::CredentialDto;

#[derive(Debug, Clone)]
struct DiscoveredTool {
    tool: McpTool,
    schema: ToolSchema,
}

type ToolCache = Result<Arc<Vec<DiscoveredTool>>, String>;

/// Adapter over an MCP server launched per call.
///
/// The tool list is fetched once with dummy values and kept for the
/// adapter's lifetime. A failed discovery sticks until the adapter is
/// rebuilt.
pub struct McpAdapter {
    info: AdapterInfo,
    launch: McpClientConfig,
    mappings: McpAdapterConfig,
    static_credentials: BTreeMap<String, String>,
    connector: Arc<dyn McpConnector>,
    tools: OnceCell<ToolCache>,
}

fn credential_fields(credential: &CredentialDto) -> BTreeMap<&'static str, String> {
    let mut fields = BTreeMap::new();
    match credential {
        CredentialDto::ApiKey { api_key } => {
            fields.insert("apikey", api_key.clone());
            fields.insert("api_key", api_key.clone());
        }
        CredentialDto::OAuth(token) => {
            fields.insert("access_token", token.access_token.clone());
            if let Some(refresh) = &token.refresh_token {
                fields.insert("refresh_token", refresh.clone());
            }
        }
        CredentialDto::Basic { username, password } => {
            fields.insert("username", username.clone());
            fields.insert("password", password.clone());
        }
        CredentialDto::None => {}
    }
    fields
}

fn parameter_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl McpAdapter {
    pub fn new(
        info: AdapterInfo,
        launch: McpClientConfig,
        mappings: McpAdapterConfig,
        static_credentials: BTreeMap<String, String>,
        connector: Arc<dyn McpConnector>,
    ) -> Self {
        Self {
            info,
            launch,
            mappings,
            static_credentials,
            connector,
            tools: OnceCell::new(),
        }
    }

    /// Launch descriptor used for discovery: dummy values only.
    fn discovery_config(&self) -> McpClientConfig {
        let mut config = self.launch.clone();
        for (field, selector) in &self.mappings.credential_mappings {
            let value = self
                .static_credentials
                .get(field)
                .or_else(|| self.mappings.dummy_credentials.get(field));
            if let Some(value) = value {
                selector.apply(&mut config, value);
            }
        }
        for (name, selector) in &self.mappings.parameter_mappings {
            if let Some(value) = self.mappings.dummy_parameters.get(name) {
                selector.apply(&mut config, value);
            }
        }
        config
    }

    /// Launch descriptor for one call with the caller's values injected.
    fn call_config(
        &self,
        credential: &CredentialDto,
        arguments: &Map<String, Value>,
    ) -> McpClientConfig {
        let mut config = self.launch.clone();
        let fields = credential_fields(credential);
        let anonymous = matches!(credential, CredentialDto::None);

        for (field, selector) in &self.mappings.credential_mappings {
            let value = fields
                .get(field.as_str())
                .or_else(|| self.static_credentials.get(field))
                .or_else(|| {
                    anonymous
                        .then(|| self.mappings.dummy_credentials.get(field))
                        .flatten()
                });
            match value {
                Some(value) => selector.apply(&mut config, value),
                None => debug!(provider = %self.info.identifier, field, "Credential field unavailable; mapping skipped"),
            }
        }

        for (name, selector) in &self.mappings.parameter_mappings {
            let value = arguments
                .get(name)
                .and_then(parameter_text)
                .or_else(|| self.mappings.dummy_parameters.get(name).cloned());
            if let Some(value) = value {
                selector.apply(&mut config, &value);
            }
        }
        config
    }

    async fn discover(&self) -> ToolCache {
        let provider = self.info.identifier.as_str();
        let config = self.discovery_config();
        let started = Instant::now();

        let listed = tokio::time::timeout(config.timeout, async {
            let mut session = self.connector.connect(provider, &config).await?;
            let tools = session.list_tools().await;
            session.close().await;
            tools
        })
        .await
        .unwrap_or(Err(McpError::Timeout(config.timeout)));

        histogram!("gateway_mcp_discovery_duration_ms", "provider" => provider.to_string())
            .record(started.elapsed().as_millis() as f64);
        match listed {
            Ok(tools) => {
                counter!("gateway_mcp_discovery_total", "provider" => provider.to_string(), "outcome" => "success")
                    .increment(1);
                info!(provider, tools = tools.len(), "Discovered MCP tools");
                Ok(Arc::new(
                    tools
                        .into_iter()
                        .map(|tool| DiscoveredTool {
                            schema: ToolSchema::from_input_schema(&tool.input_schema),
                            tool,
                        })
                        .collect(),
                ))
            }
            Err(error) => {
                counter!("gateway_mcp_discovery_total", "provider" => provider.to_string(), "outcome" => "failure")
                    .increment(1);
                warn!(provider, %error, "MCP tool discovery failed; reload the adapter to retry");
                Err(error.to_string())
            }
        }
    }

    async fn tools(&self) -> Result<Arc<Vec<DiscoveredTool>>, AdapterError> {
        self.tools
            .get_or_init(|| self.discover())
            .await
            .clone()
            .map_err(AdapterError::Discovery)
    }

    async fn call(
        &self,
        config: &McpClientConfig,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallOutput, AdapterError> {
        let provider = self.info.identifier.as_str();
        counter!("gateway_mcp_spawn_total", "provider" => provider.to_string()).increment(1);

        let outcome = tokio::time::timeout(config.timeout, async {
            let mut session = self.connector.connect(provider, config).await?;
            let output = session.call_tool(tool, arguments).await;
            session.close().await;
            output
        })
        .await;

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => Err(AdapterError::Upstream(error.to_string())),
            Err(_) => Err(AdapterError::Timeout(config.timeout)),
        }
    }
}

#[async_trait]
impl Adapter for McpAdapter {
    fn info(&self) -> AdapterInfo {
        self.info.clone()
    }

    async fn operations(&self) -> Result<Vec<AdapterOperation>, AdapterError> {
        Ok(self
            .tools()
            .await?
            .iter()
            .map(|discovered| AdapterOperation {
                identifier: discovered.tool.name.clone(),
                description: discovered.tool.description.clone(),
                parameters: discovered.schema.parameters().to_vec(),
            })
            .collect())
    }

    #[instrument(skip(self, parameters, credential), fields(provider = %self.info.identifier))]
    async fn execute(
        &self,
        operation: &str,
        parameters: Value,
        credential: &CredentialDto,
    ) -> Result<Value, AdapterError> {
        let tools = self.tools().await?;
        let discovered = tools
            .iter()
            .find(|d| d.tool.name == operation)
            .ok_or_else(|| AdapterError::OperationNotSupported(operation.to_string()))?;

        if self.info.auth_type != AuthType::None && matches!(credential, CredentialDto::None) {
            return Err(AdapterError::Unauthorized(format!(
                "provider '{}' requires a {} credential",
                self.info.identifier, self.info.auth_type
            )));
        }

        let mut arguments = match parameters {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            _ => {
                return Err(AdapterError::InvalidParameters(
                    "parameters must be a JSON object".into(),
                ));
            }
        };
        discovered
            .schema
            .validate(&arguments)
            .map_err(AdapterError::InvalidParameters)?;

        let config = self.call_config(credential, &arguments);
        // Values consumed by the launch descriptor are not tool arguments
        // unless the tool itself declares them.
        arguments.retain(|name, _| {
            !self.mappings.parameter_mappings.contains_key(name) || discovered.schema.declares(name)
        });

        let output = self.call(&config, operation, arguments).await?;
        let mut result = json!({
            "operation": operation,
            "success": !output.is_error,
            "content": output.content,
        });
        if output.is_error {
            result["error"] = Value::String(output.text());
        }
        Ok(result)
    }
}
