//! Database migrations for the tool-invocation gateway.

pub use sea_orm_migration::prelude::*;

mod m2025_12_01_000001_create_providers;
mod m2025_12_01_000002_create_operations;
mod m2025_12_01_000003_create_provider_adapters;
mod m2025_12_01_000004_create_provider_translations;
mod m2025_12_01_000005_create_invocations;
mod m2025_12_01_000006_create_credentials;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_12_01_000001_create_providers::Migration),
            Box::new(m2025_12_01_000002_create_operations::Migration),
            Box::new(m2025_12_01_000003_create_provider_adapters::Migration),
            Box::new(m2025_12_01_000004_create_provider_translations::Migration),
            Box::new(m2025_12_01_000005_create_invocations::Migration),
            Box::new(m2025_12_01_000006_create_credentials::Migration),
        ]
    }
}
