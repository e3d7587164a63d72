//! # Data Models
//!
//! SeaORM entity models for the gateway tables plus small shared response
//! types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod credential;
pub mod invocation;
pub mod operation;
pub mod provider;
pub mod provider_adapter;
pub mod provider_translation;

pub use credential::Entity as Credential;
pub use invocation::Entity as Invocation;
pub use operation::Entity as Operation;
pub use provider::Entity as Provider;
pub use provider_adapter::Entity as ProviderAdapter;
pub use provider_translation::Entity as ProviderTranslation;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "tool-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
