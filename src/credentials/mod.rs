//! # Credential Store
//!
//! Per-user provider credentials sealed with AES-256-GCM. Only the
//! credential facade hands secrets to other modules, as
//! [`CredentialDto`](crate::contracts::CredentialDto).

mod facade;
mod store;

pub use facade::CredentialFacade;
pub use store::{Credential, CredentialStore, Secret};

#[cfg(test)]
pub(crate) use store::memory::MemoryCredentialRepository;

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential for provider '{provider}' and user {user_id}")]
    NotFound { user_id: Uuid, provider: String },
    #[error("invalid credential: {0}")]
    Invalid(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("stored credential is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("credential repository failure: {0}")]
    Repository(#[source] anyhow::Error),
}
