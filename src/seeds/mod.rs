//! Database seeding
//!
//! Persists what the provider loader read from disk so the catalog, the
//! translation store and the adapter factory all see the same providers.

pub mod provider;

pub use provider::{SeedReport, seed_providers};
