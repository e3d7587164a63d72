//! Provider seeding
//!
//! Upserts loaded providers by identifier. Existing providers keep their id,
//! their operation ids (matched by identifier) and, when the manifest
//! declares no tags, their current tag set.

use anyhow::Result;
use tracing::{info, warn};

use crate::catalog::{CatalogError, ProviderCatalog};
use crate::loader::LoadedProvider;
use crate::repositories::DbAdapterConfigRepository;
use crate::translations::TranslationStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Seeds every loaded provider, logging and counting the ones that fail.
pub async fn seed_providers(
    loaded: Vec<LoadedProvider>,
    catalog: &ProviderCatalog,
    translations: &TranslationStore,
    adapter_configs: &DbAdapterConfigRepository,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for entry in loaded {
        let identifier = entry.provider.identifier.clone();
        match seed_one(entry, catalog, translations, adapter_configs).await {
            Ok(true) => report.created += 1,
            Ok(false) => report.updated += 1,
            Err(error) => {
                warn!(provider = %identifier, error = ?error, "Failed to seed provider");
                report.failed += 1;
            }
        }
    }

    info!(
        created = report.created,
        updated = report.updated,
        failed = report.failed,
        "Provider seeding finished"
    );
    Ok(report)
}

/// Returns true when the provider was created.
async fn seed_one(
    entry: LoadedProvider,
    catalog: &ProviderCatalog,
    translations: &TranslationStore,
    adapter_configs: &DbAdapterConfigRepository,
) -> Result<bool> {
    let LoadedProvider {
        mut provider,
        adapter,
        translations: bundles,
    } = entry;
    let identifier = provider.identifier.clone();

    for (language, payload) in &bundles {
        if let Err(error) = translations
            .store_translation(&identifier, language, payload)
            .await
        {
            warn!(provider = %identifier, language = %language, %error, "Skipping translation");
        }
    }

    let created = match catalog.get_by_identifier(&identifier).await {
        Ok(existing) => {
            provider.id = existing.id;
            if provider.tags.is_empty() {
                provider.tags = existing.tags.clone();
            }
            catalog.update(provider).await?;
            false
        }
        Err(CatalogError::NotFound(_)) => {
            catalog.create(provider).await?;
            true
        }
        Err(error) => return Err(error.into()),
    };

    adapter_configs.upsert(&identifier, &adapter).await?;
    catalog.invalidate(&identifier).await;
    Ok(created)
}
