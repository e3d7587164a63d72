//! Template registry
//!
//! Explicit map from template identifier to [`AdapterTemplate`], seeded once
//! at startup by [`TemplateRegistry::with_defaults`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::mcp::{McpConnector, McpTemplate};
use super::oauth::{OAuth2Refresher, OAuth2Settings, OAuthAdapter};
use super::{Adapter, AdapterError, ProviderAdapterConfig};
use crate::catalog::AuthType;

/// An adapter plus its optional OAuth helper.
#[derive(Clone)]
pub struct BuiltAdapter {
    pub adapter: Arc<dyn Adapter>,
    pub oauth: Option<Arc<dyn OAuthAdapter>>,
}

pub trait AdapterTemplate: Send + Sync {
    fn identifier(&self) -> &'static str;

    /// Checks required fields and supported auth types.
    fn validate_config(&self, config: &ProviderAdapterConfig) -> Result<(), AdapterError>;

    fn create_adapter(&self, config: &ProviderAdapterConfig) -> Result<BuiltAdapter, AdapterError>;
}

/// Builds the OAuth helper for providers that declare an `oauth_config`.
pub fn oauth_helper(
    config: &ProviderAdapterConfig,
    default_skew: Duration,
) -> Result<Option<Arc<dyn OAuthAdapter>>, AdapterError> {
    match (&config.auth_type, &config.oauth_config) {
        (AuthType::OAuth, Some(raw)) => {
            let settings = OAuth2Settings::from_value(&config.identifier, raw)?;
            let refresher = OAuth2Refresher::new(&config.identifier, settings, default_skew)?;
            Ok(Some(Arc::new(refresher)))
        }
        (AuthType::OAuth, None) => {
            warn!(provider = %config.identifier, "OAuth provider without oauth_config; tokens will not be refreshed");
            Ok(None)
        }
        _ => Ok(None),
    }
}

#[derive(Default, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<&'static str, Arc<dyn AdapterTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in template.
    pub fn with_defaults(
        connector: Arc<dyn McpConnector>,
        default_timeout: Duration,
        expiry_skew: Duration,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(McpTemplate::new(connector, default_timeout, expiry_skew)));
        registry
    }

    pub fn register(&mut self, template: Arc<dyn AdapterTemplate>) {
        let identifier = template.identifier();
        if self.templates.insert(identifier, template).is_some() {
            warn!(template = identifier, "Adapter template registered twice; keeping the last one");
        }
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn AdapterTemplate>> {
        self.templates.get(identifier).cloned()
    }

    /// Template for a provider: one registered under the provider's own
    /// identifier wins over `custom_config.template`.
    pub fn select(&self, config: &ProviderAdapterConfig) -> Result<Arc<dyn AdapterTemplate>, AdapterError> {
        if let Some(template) = self.get(&config.identifier) {
            return Ok(template);
        }
        match config.template_hint() {
            Some(hint) => self
                .get(hint)
                .ok_or_else(|| AdapterError::UnknownTemplate(hint.to_string())),
            None => Err(AdapterError::UnknownTemplate(config.identifier.clone())),
        }
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.templates.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mcp::testing::FakeConnector;
    use serde_json::{Map, json};
    use uuid::Uuid;

    fn config(identifier: &str, custom: serde_json::Value) -> ProviderAdapterConfig {
        let custom_config: Map<String, serde_json::Value> = match custom {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        ProviderAdapterConfig {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            name: identifier.to_string(),
            description: String::new(),
            auth_type: AuthType::None,
            oauth_config: None,
            custom_config,
        }
    }

    fn registry() -> TemplateRegistry {
        TemplateRegistry::with_defaults(
            Arc::new(FakeConnector::default()),
            Duration::from_secs(5),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn selects_template_from_custom_config() {
        let registry = registry();
        assert_eq!(registry.identifiers(), vec!["mcp"]);

        let template = registry
            .select(&config("filesystem", json!({"template": "mcp"})))
            .unwrap();
        assert_eq!(template.identifier(), "mcp");
    }

    #[test]
    fn unknown_template_is_reported() {
        let registry = registry();
        let err = registry
            .select(&config("notion", json!({"template": "rest"})))
            .err()
            .unwrap();
        assert!(matches!(err, AdapterError::UnknownTemplate(name) if name == "rest"));

        assert!(matches!(
            registry.select(&config("notion", json!({}))),
            Err(AdapterError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn oauth_helper_only_for_oauth_providers() {
        let mut cfg = config("github", json!({}));
        cfg.oauth_config = Some(json!({
            "client_id": "id",
            "auth_url": "https://github.com/login/oauth/authorize",
            "token_url": "https://github.com/login/oauth/access_token",
        }));
        assert!(oauth_helper(&cfg, Duration::from_secs(300)).unwrap().is_none());

        cfg.auth_type = AuthType::OAuth;
        let helper = oauth_helper(&cfg, Duration::from_secs(300)).unwrap().unwrap();
        assert_eq!(helper.expiry_skew(), Duration::from_secs(300));
    }
}
