//! # Provider Catalog
//!
//! Provider aggregates with their operations, permissions and parameters,
//! the translated projections served to callers, and the scope reasoning
//! used by the credential endpoints.

pub mod domain;
mod facade;
pub mod permissions;
pub mod service;
pub mod translation;

pub use domain::{
    AuthType, Operation, Parameter, ParameterType, Permission, Provider, ProviderInvariantError,
    ProviderStatus,
};
pub use facade::CatalogFacade;
pub(crate) use facade::{operation_dto, parameter_dto};
pub use permissions::PermissionSet;
pub use service::{
    CatalogError, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, ProviderCatalog, ProviderPage, ProviderQuery,
    SortField, SortOrder,
};
pub use translation::{TranslatedProvider, api_doc_url};
