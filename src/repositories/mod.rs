//! # Repository Layer
//!
//! Storage traits consumed by the catalog, translation store, credential
//! store and invocation service, each with a SeaORM backed implementation.

pub mod adapter_config;
pub mod credential;
pub mod invocation;
pub mod operation;
pub mod provider;
pub mod translation;

pub use adapter_config::{AdapterConfigSource, AdapterConfigs, DbAdapterConfigRepository};
pub use credential::{CredentialRecord, CredentialRepository, DbCredentialRepository, SecretUpdate};
pub use invocation::{DbInvocationRepository, InvocationRepository};
pub use operation::{DbOperationRepository, OperationRepository};
pub use provider::{DbProviderRepository, ProviderFilter, ProviderRepository};
pub use translation::{DbTranslationRepository, TranslationRecord, TranslationRepository};
