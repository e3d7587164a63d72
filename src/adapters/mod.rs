//! # Adapters
//!
//! Provider adapters execute named operations against an external provider.
//! Adapters are built from a [`ProviderAdapterConfig`] by an
//! [`AdapterTemplate`](registry::AdapterTemplate) chosen from the
//! [`TemplateRegistry`](registry::TemplateRegistry), and owned by the
//! [`AdapterFactory`](factory::AdapterFactory).

pub mod facade;
pub mod factory;
pub mod mcp;
pub mod oauth;
pub mod registry;

pub use facade::AdapterFacade;
pub use factory::{AdapterFactory, AdapterStatus};
pub use oauth::{OAuth2Refresher, OAuth2Settings, OAuthAdapter};
pub use registry::{AdapterTemplate, BuiltAdapter, TemplateRegistry};

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{AuthType, Parameter};
use crate::contracts::CredentialDto;

/// Everything a template needs to build an adapter for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAdapterConfig {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub auth_type: AuthType,
    pub oauth_config: Option<Value>,
    pub custom_config: Map<String, Value>,
}

impl ProviderAdapterConfig {
    /// Template named in `custom_config.template`, if any.
    pub fn template_hint(&self) -> Option<&str> {
        self.custom_config.get("template").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub auth_type: AuthType,
    pub template: String,
}

/// Operation exposed by a loaded adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOperation {
    pub identifier: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("operation '{0}' is not supported by this provider")]
    OperationNotSupported(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("token refresh failed: {0}")]
    AuthFailed(String),
    #[error("provider call failed: {0}")]
    Upstream(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("tool discovery failed: {0}")]
    Discovery(String),
    #[error("invalid adapter configuration for '{identifier}': {reason}")]
    InvalidConfig { identifier: String, reason: String },
    #[error("no adapter template '{0}'")]
    UnknownTemplate(String),
    #[error("no adapter configuration for provider '{0}'")]
    NotConfigured(String),
    #[error("adapter configuration source failure: {0}")]
    Source(#[source] anyhow::Error),
}

impl AdapterError {
    pub fn invalid_config(identifier: &str, reason: impl Into<String>) -> Self {
        AdapterError::InvalidConfig {
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait Adapter: Send + Sync {
    fn info(&self) -> AdapterInfo;

    /// Operations this adapter can execute. May trigger discovery.
    async fn operations(&self) -> Result<Vec<AdapterOperation>, AdapterError>;

    async fn execute(
        &self,
        operation: &str,
        parameters: Value,
        credential: &CredentialDto,
    ) -> Result<Value, AdapterError>;
}
