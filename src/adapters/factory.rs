//! Adapter factory
//!
//! Owns every loaded adapter. Adapters are built outside the lock and
//! swapped in whole, so readers see either the previous adapter or the new
//! one. Callers clone the `Arc` and release the lock before executing, which
//! lets an in-flight call finish on the adapter it started with.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::oauth::OAuthAdapter;
use super::registry::{BuiltAdapter, TemplateRegistry};
use super::{Adapter, AdapterError, ProviderAdapterConfig};
use crate::repositories::AdapterConfigSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterStatus {
    pub identifier: String,
    pub loaded: bool,
    pub template: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
struct LoadedAdapter {
    built: BuiltAdapter,
    template: &'static str,
}

#[derive(Default)]
struct FactoryState {
    adapters: HashMap<String, LoadedAdapter>,
    errors: HashMap<String, String>,
}

impl FactoryState {
    fn status(&self, identifier: &str) -> AdapterStatus {
        AdapterStatus {
            identifier: identifier.to_string(),
            loaded: self.adapters.contains_key(identifier),
            template: self
                .adapters
                .get(identifier)
                .map(|loaded| loaded.template.to_string()),
            error: self.errors.get(identifier).cloned(),
        }
    }
}

pub struct AdapterFactory {
    registry: Arc<TemplateRegistry>,
    source: Arc<dyn AdapterConfigSource>,
    state: RwLock<FactoryState>,
}

impl AdapterFactory {
    pub fn new(registry: Arc<TemplateRegistry>, source: Arc<dyn AdapterConfigSource>) -> Self {
        Self {
            registry,
            source,
            state: RwLock::new(FactoryState::default()),
        }
    }

    fn build(&self, config: &ProviderAdapterConfig) -> Result<LoadedAdapter, AdapterError> {
        let template = self.registry.select(config)?;
        template.validate_config(config)?;
        let built = template.create_adapter(config)?;
        Ok(LoadedAdapter {
            built,
            template: template.identifier(),
        })
    }

    pub async fn get_adapter(&self, identifier: &str) -> Option<Arc<dyn Adapter>> {
        self.state
            .read()
            .await
            .adapters
            .get(identifier)
            .map(|loaded| loaded.built.adapter.clone())
    }

    pub async fn get_oauth_adapter(&self, identifier: &str) -> Option<Arc<dyn OAuthAdapter>> {
        self.state
            .read()
            .await
            .adapters
            .get(identifier)
            .and_then(|loaded| loaded.built.oauth.clone())
    }

    pub async fn statuses(&self) -> Vec<AdapterStatus> {
        let state = self.state.read().await;
        let mut identifiers: Vec<&String> = state.adapters.keys().chain(state.errors.keys()).collect();
        identifiers.sort();
        identifiers.dedup();
        identifiers.into_iter().map(|id| state.status(id)).collect()
    }

    /// Rebuilds one provider's adapter from its stored configuration.
    #[instrument(skip(self))]
    pub async fn reload_provider(&self, identifier: &str) -> Result<AdapterStatus, AdapterError> {
        let config = self
            .source
            .get(identifier)
            .await
            .map_err(AdapterError::Source)?;

        let Some(config) = config else {
            let mut state = self.state.write().await;
            state.adapters.remove(identifier);
            state.errors.remove(identifier);
            return Err(AdapterError::NotConfigured(identifier.to_string()));
        };

        let built = self.build(&config);
        let mut state = self.state.write().await;
        match built {
            Ok(loaded) => {
                info!(provider = identifier, template = loaded.template, "Adapter loaded");
                state.errors.remove(identifier);
                state.adapters.insert(identifier.to_string(), loaded);
            }
            Err(error) => {
                warn!(provider = identifier, %error, "Adapter failed to load");
                state.adapters.remove(identifier);
                state.errors.insert(identifier.to_string(), error.to_string());
            }
        }
        Ok(state.status(identifier))
    }

    /// Rebuilds every adapter and replaces the whole map at once.
    #[instrument(skip(self))]
    pub async fn reload_all(&self) -> Result<Vec<AdapterStatus>, AdapterError> {
        let configs = self.source.list().await.map_err(AdapterError::Source)?;

        let mut next = FactoryState::default();
        for config in &configs {
            match self.build(config) {
                Ok(loaded) => {
                    next.adapters.insert(config.identifier.clone(), loaded);
                }
                Err(error) => {
                    warn!(provider = %config.identifier, %error, "Adapter failed to load");
                    next.errors.insert(config.identifier.clone(), error.to_string());
                }
            }
        }
        info!(
            loaded = next.adapters.len(),
            failed = next.errors.len(),
            "Adapters reloaded"
        );

        *self.state.write().await = next;
        Ok(self.statuses().await)
    }
}
