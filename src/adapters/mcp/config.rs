use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::mapping::TargetSelector;
use crate::adapters::AdapterError;

/// Launch descriptor for one MCP subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpClientConfig {
    pub command: String,
    pub args: Vec<String>,
    pub envs: BTreeMap<String, String>,
    pub timeout: Duration,
}

/// Injection rules applied to a [`McpClientConfig`] before each launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct McpAdapterConfig {
    pub credential_mappings: BTreeMap<String, TargetSelector>,
    pub parameter_mappings: BTreeMap<String, TargetSelector>,
    pub dummy_credentials: BTreeMap<String, String>,
    pub dummy_parameters: BTreeMap<String, String>,
}

/// The `mcp` block of a provider's `custom_config`.
#[derive(Debug, Clone, Deserialize)]
struct McpSettings {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    envs: BTreeMap<String, String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(flatten)]
    mappings: McpAdapterConfig,
}

/// Provider wide secrets from `custom_config`, exposed as credential fields.
pub fn static_credentials(custom_config: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut take = |block: &str, field: &str, name: &str| {
        if let Some(value) = custom_config
            .get(block)
            .and_then(|b| b.get(field))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
        {
            fields.insert(name.to_string(), value.to_string());
        }
    };
    take("api_key_config", "value", "apikey");
    take("volcengine_credentials", "access_key_id", "access_key_id");
    take("volcengine_credentials", "secret_access_key", "secret_access_key");
    take("openai_credentials", "api_key", "openai_api_key");
    take("openai_credentials", "base_url", "openai_base_url");
    fields
}

pub fn parse(
    identifier: &str,
    custom_config: &Map<String, Value>,
    default_timeout: Duration,
) -> Result<(McpClientConfig, McpAdapterConfig), AdapterError> {
    let raw = custom_config
        .get("mcp")
        .ok_or_else(|| AdapterError::invalid_config(identifier, "custom_config.mcp is missing"))?;
    let settings: McpSettings = serde_json::from_value(raw.clone())
        .map_err(|e| AdapterError::invalid_config(identifier, format!("custom_config.mcp: {e}")))?;

    if settings.command.trim().is_empty() {
        return Err(AdapterError::invalid_config(identifier, "mcp.command is empty"));
    }
    let timeout = match settings.timeout_seconds {
        Some(0) => return Err(AdapterError::invalid_config(identifier, "mcp.timeout_seconds is zero")),
        Some(seconds) => Duration::from_secs(seconds),
        None => default_timeout,
    };

    Ok((
        McpClientConfig {
            command: settings.command,
            args: settings.args,
            envs: settings.envs,
            timeout,
        },
        settings.mappings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn custom(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_launch_and_mappings() {
        let (client, mappings) = parse(
            "search",
            &custom(json!({
                "mcp": {
                    "command": "npx",
                    "args": ["-y", "search-server"],
                    "envs": {"LOG": "info"},
                    "timeout_seconds": 12,
                    "credential_mappings": {"apikey": "env:API_KEY"},
                    "dummy_credentials": {"apikey": "dummy"},
                }
            })),
            Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(client.args, vec!["-y", "search-server"]);
        assert_eq!(client.timeout, Duration::from_secs(12));
        assert_eq!(
            mappings.credential_mappings["apikey"],
            TargetSelector::Env("API_KEY".into())
        );
        assert_eq!(mappings.dummy_credentials["apikey"], "dummy");
        assert!(mappings.parameter_mappings.is_empty());
    }

    #[test]
    fn rejects_bad_selector_and_missing_block() {
        let err = parse(
            "search",
            &custom(json!({"mcp": {"command": "npx", "credential_mappings": {"apikey": "API_KEY"}}})),
            Duration::from_secs(60),
        )
        .unwrap_err();
        assert!(err.to_string().contains("env:KEY"));

        assert!(parse("search", &Map::new(), Duration::from_secs(60)).is_err());
    }

    #[test]
    fn collects_static_credentials() {
        let fields = static_credentials(&custom(json!({
            "api_key_config": {"value": "k"},
            "openai_credentials": {"api_key": "sk", "base_url": ""},
        })));
        assert_eq!(fields["apikey"], "k");
        assert_eq!(fields["openai_api_key"], "sk");
        assert!(!fields.contains_key("openai_base_url"));
    }
}
