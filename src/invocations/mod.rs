//! # Invocations
//!
//! Orchestrates a single operation call and owns the invocation record.

pub mod breaker;
pub mod model;
pub mod service;

pub use breaker::CircuitBreaker;
pub use model::{AlreadyCompleted, Invocation, InvocationStatus};
pub use service::{
    DEFAULT_LIST_LIMIT, InvocationDeps, InvocationPage, InvocationService, InvocationSettings,
    MAX_LIST_LIMIT, token_lock_key,
};
