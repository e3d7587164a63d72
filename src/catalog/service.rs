//! Provider catalog service
//!
//! Owns the provider aggregates. Reads go through an LRU keyed by both id
//! and identifier; writes invalidate both keys before emitting events.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::Utc;
use lru::LruCache;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::events::{Event, EventMetadata, EventPublisher, EventType, publish_best_effort};
use crate::i18n::{LanguageTag, SUPPORTED_LANGUAGES};
use crate::repositories::{OperationRepository, ProviderFilter, ProviderRepository};
use crate::translations::{TranslationError, TranslationStore};

use super::domain::{AuthType, Operation, Provider, ProviderInvariantError, ProviderStatus};
use super::translation::{TranslatedProvider, overlay};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("provider '{0}' not found")]
    NotFound(String),
    #[error("provider '{0}' already exists")]
    Conflict(String),
    #[error(transparent)]
    Invalid(#[from] ProviderInvariantError),
    #[error("catalog repository failure: {0}")]
    Repository(#[source] anyhow::Error),
}

impl From<anyhow::Error> for CatalogError {
    fn from(error: anyhow::Error) -> Self {
        CatalogError::Repository(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    #[default]
    Name,
    Identifier,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created_at" => Some(SortField::CreatedAt),
            "updated_at" => Some(SortField::UpdatedAt),
            "name" => Some(SortField::Name),
            "identifier" => Some(SortField::Identifier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

pub const MAX_PAGE_SIZE: u64 = 100;
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Listing query. `page` is 1-based; `page_size` is clamped to
/// [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone)]
pub struct ProviderQuery {
    pub status: Option<ProviderStatus>,
    pub auth_type: Option<AuthType>,
    pub tag: Option<String>,
    pub name: Option<String>,
    /// Leaves deprecated providers out when no status is requested.
    pub listed_only: bool,
    pub sort: SortField,
    pub order: SortOrder,
    pub page: u64,
    pub page_size: u64,
}

impl Default for ProviderQuery {
    fn default() -> Self {
        Self {
            status: None,
            auth_type: None,
            tag: None,
            name: None,
            listed_only: false,
            sort: SortField::default(),
            order: SortOrder::default(),
            page: 1,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl ProviderQuery {
    pub fn active() -> Self {
        Self {
            status: Some(ProviderStatus::Active),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderPage {
    pub items: Vec<Arc<Provider>>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Id(Uuid),
    Identifier(String),
}

pub struct ProviderCatalog {
    providers: Arc<dyn ProviderRepository>,
    operations: Arc<dyn OperationRepository>,
    translations: Arc<TranslationStore>,
    events: Arc<dyn EventPublisher>,
    cache: Mutex<LruCache<CacheKey, Arc<Provider>>>,
}

fn provider_payload(provider: &Provider) -> Value {
    json!({
        "id": provider.id,
        "identifier": provider.identifier,
        "name": provider.name,
        "auth_type": provider.auth_type.as_str(),
        "status": provider.status.as_str(),
        "operations": provider.operations.iter().map(|op| op.identifier.as_str()).collect::<Vec<_>>(),
    })
}

impl ProviderCatalog {
    pub fn new(
        providers: Arc<dyn ProviderRepository>,
        operations: Arc<dyn OperationRepository>,
        translations: Arc<TranslationStore>,
        events: Arc<dyn EventPublisher>,
        capacity: NonZeroUsize,
    ) -> Self {
        Self {
            providers,
            operations,
            translations,
            events,
            // Each provider occupies two slots
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.get().saturating_mul(2)).unwrap_or(capacity),
            )),
        }
    }

    async fn cached(&self, key: &CacheKey) -> Option<Arc<Provider>> {
        self.cache.lock().await.get(key).cloned()
    }

    async fn remember(&self, provider: Arc<Provider>) {
        let mut cache = self.cache.lock().await;
        cache.put(CacheKey::Id(provider.id), provider.clone());
        cache.put(CacheKey::Identifier(provider.identifier.clone()), provider);
    }

    async fn forget(&self, id: Uuid, identifiers: &[&str]) {
        let mut cache = self.cache.lock().await;
        cache.pop(&CacheKey::Id(id));
        for identifier in identifiers {
            cache.pop(&CacheKey::Identifier((*identifier).to_string()));
        }
    }

    /// Attaches operations and translations to a bare repository row.
    async fn hydrate(&self, mut provider: Provider) -> Result<Arc<Provider>, CatalogError> {
        provider.operations = self.operations.list_for_provider(provider.id).await?;
        provider.translations = self.load_translations(&provider).await;
        Ok(Arc::new(provider))
    }

    /// Overlays every stored supported-language bundle. Lookups go through
    /// the translation store's cache; failures leave that language out.
    async fn load_translations(&self, provider: &Provider) -> BTreeMap<LanguageTag, TranslatedProvider> {
        let mut translations = BTreeMap::new();
        for code in SUPPORTED_LANGUAGES {
            let bundle = match self
                .translations
                .get_provider_translation(&provider.identifier, code)
                .await
            {
                Ok(bundle) => bundle,
                Err(TranslationError::NotFound { .. }) => continue,
                Err(error) => {
                    warn!(provider = %provider.identifier, language = code, %error, "Skipping translation");
                    continue;
                }
            };
            let Some(tag) = LanguageTag::parse(code) else {
                continue;
            };
            let translated = overlay(provider, &bundle, tag.clone());
            translations.insert(tag, translated);
        }
        translations
    }

    async fn publish(&self, event_type: EventType, provider: &Provider, payload: Value) {
        let metadata = EventMetadata::current().with_provider(provider.identifier.clone());
        publish_best_effort(self.events.as_ref(), Event::new(event_type, metadata, payload)).await;
    }

    async fn publish_operation(&self, event_type: EventType, provider: &Provider, operation: &Operation) {
        let metadata = EventMetadata::current()
            .with_provider(provider.identifier.clone())
            .with_operation(operation.identifier.clone());
        let payload = serde_json::to_value(operation).unwrap_or(Value::Null);
        publish_best_effort(self.events.as_ref(), Event::new(event_type, metadata, payload)).await;
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Arc<Provider>, CatalogError> {
        if let Some(provider) = self.cached(&CacheKey::Id(id)).await {
            return Ok(provider);
        }
        let provider = self
            .providers
            .find_by_id(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let provider = self.hydrate(provider).await?;
        self.remember(provider.clone()).await;
        Ok(provider)
    }

    #[instrument(skip(self))]
    pub async fn get_by_identifier(&self, identifier: &str) -> Result<Arc<Provider>, CatalogError> {
        if let Some(provider) = self.cached(&CacheKey::Identifier(identifier.to_string())).await {
            return Ok(provider);
        }
        let provider = self
            .providers
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| CatalogError::NotFound(identifier.to_string()))?;
        let provider = self.hydrate(provider).await?;
        self.remember(provider.clone()).await;
        Ok(provider)
    }

    /// Every provider matching the SQL-level filter, hydrated. Providers
    /// not yet cached are loaded and remembered.
    pub async fn list_all(&self, filter: &ProviderFilter) -> Result<Vec<Arc<Provider>>, CatalogError> {
        let rows = self.providers.list(filter).await?;
        let mut providers = Vec::with_capacity(rows.len());
        for row in rows {
            let provider = match self.cached(&CacheKey::Id(row.id)).await {
                Some(cached) if cached.updated_at == row.updated_at => cached,
                _ => {
                    let hydrated = self.hydrate(row).await?;
                    self.remember(hydrated.clone()).await;
                    hydrated
                }
            };
            providers.push(provider);
        }
        Ok(providers)
    }

    /// Lists providers matching the query and warms the cache.
    #[instrument(skip(self))]
    pub async fn list(&self, query: &ProviderQuery) -> Result<ProviderPage, CatalogError> {
        let filter = ProviderFilter {
            status: query.status,
            auth_type: query.auth_type,
            listed_only: query.listed_only,
        };
        let mut providers = self.list_all(&filter).await?;

        let tag = query.tag.as_deref().map(str::to_lowercase);
        let name = query.name.as_deref().map(str::to_lowercase);
        providers.retain(|provider| {
            let tag_ok = tag
                .as_deref()
                .is_none_or(|tag| provider.tags.iter().any(|t| t.to_lowercase() == tag));
            let name_ok = name.as_deref().is_none_or(|needle| {
                provider.name.to_lowercase().contains(needle)
                    || provider.identifier.to_lowercase().contains(needle)
            });
            tag_ok && name_ok
        });

        providers.sort_by(|a, b| {
            let ordering = match query.sort {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortField::Identifier => Ordering::Equal,
            }
            .then_with(|| a.identifier.cmp(&b.identifier));
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
        let page = query.page.max(1);
        let total = providers.len() as u64;
        let skip = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
        let items = providers
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect();

        Ok(ProviderPage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Distinct categories over active providers.
    pub async fn categories(&self) -> Result<BTreeSet<String>, CatalogError> {
        let filter = ProviderFilter {
            status: Some(ProviderStatus::Active),
            auth_type: None,
            listed_only: true,
        };
        Ok(self
            .list_all(&filter)
            .await?
            .iter()
            .flat_map(|provider| provider.categories.iter().cloned())
            .collect())
    }

    async fn reload(&self, id: Uuid, identifier: &str) -> Result<Arc<Provider>, CatalogError> {
        let row = self
            .providers
            .find_by_id(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(identifier.to_string()))?;
        let provider = self.hydrate(row).await?;
        self.remember(provider.clone()).await;
        Ok(provider)
    }

    #[instrument(skip(self, provider), fields(provider = %provider.identifier))]
    pub async fn create(&self, mut provider: Provider) -> Result<Arc<Provider>, CatalogError> {
        provider.validate()?;
        if self.providers.find_by_identifier(&provider.identifier).await?.is_some() {
            return Err(CatalogError::Conflict(provider.identifier));
        }

        let now = Utc::now();
        provider.created_at = now;
        provider.updated_at = now;
        for operation in &mut provider.operations {
            operation.provider_id = provider.id;
        }

        self.providers.insert(&provider).await?;
        self.operations
            .replace_for_provider(provider.id, &provider.operations)
            .await?;

        let stored = self.reload(provider.id, &provider.identifier).await?;

        self.publish(EventType::ProviderCreated, &stored, provider_payload(&stored))
            .await;
        for operation in &stored.operations {
            self.publish_operation(EventType::OperationCreated, &stored, operation)
                .await;
        }
        Ok(stored)
    }

    /// Replaces the provider's metadata and operation set. Operations keep
    /// their id when their identifier survives.
    #[instrument(skip(self, provider), fields(provider = %provider.identifier))]
    pub async fn update(&self, mut provider: Provider) -> Result<Arc<Provider>, CatalogError> {
        provider.validate()?;
        let existing = self
            .providers
            .find_by_id(provider.id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(provider.identifier.clone()))?;
        if existing.identifier != provider.identifier
            && self.providers.find_by_identifier(&provider.identifier).await?.is_some()
        {
            return Err(CatalogError::Conflict(provider.identifier));
        }
        let previous_operations = self.operations.list_for_provider(existing.id).await?;
        let previous: HashMap<&str, &Operation> = previous_operations
            .iter()
            .map(|op| (op.identifier.as_str(), op))
            .collect();

        provider.created_at = existing.created_at;
        provider.updated_at = Utc::now();
        for operation in &mut provider.operations {
            operation.provider_id = provider.id;
            if let Some(old) = previous.get(operation.identifier.as_str()) {
                operation.id = old.id;
            }
        }

        self.providers.update(&provider).await?;
        self.operations
            .replace_for_provider(provider.id, &provider.operations)
            .await?;
        self.forget(provider.id, &[&existing.identifier, &provider.identifier])
            .await;

        let stored = self.reload(provider.id, &provider.identifier).await?;

        self.publish(EventType::ProviderUpdated, &stored, provider_payload(&stored))
            .await;
        let current: BTreeSet<&str> = stored
            .operations
            .iter()
            .map(|op| op.identifier.as_str())
            .collect();
        for operation in &stored.operations {
            match previous.get(operation.identifier.as_str()) {
                None => {
                    self.publish_operation(EventType::OperationCreated, &stored, operation)
                        .await
                }
                Some(old) if !same_operation(old, operation) => {
                    self.publish_operation(EventType::OperationUpdated, &stored, operation)
                        .await
                }
                Some(_) => {}
            }
        }
        for operation in previous_operations
            .iter()
            .filter(|op| !current.contains(op.identifier.as_str()))
        {
            self.publish_operation(EventType::OperationDeleted, &stored, operation)
                .await;
        }
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), CatalogError> {
        let existing = self
            .providers
            .find_by_id(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        if !self.providers.soft_delete(id).await? {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        self.forget(id, &[&existing.identifier]).await;
        self.publish(EventType::ProviderDeleted, &existing, provider_payload(&existing))
            .await;
        Ok(())
    }

    /// Replaces the provider's tag set.
    #[instrument(skip(self, tags))]
    pub async fn sync_tags_to_provider(
        &self,
        id: Uuid,
        tags: impl IntoIterator<Item = String>,
    ) -> Result<Arc<Provider>, CatalogError> {
        let tags: BTreeSet<String> = tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        let existing = self
            .providers
            .find_by_id(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        if !self.providers.set_tags(id, &tags).await? {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        self.forget(id, &[&existing.identifier]).await;
        self.get_by_id(id).await
    }

    /// Drops the cached aggregate so the next read reloads translations.
    pub async fn invalidate(&self, identifier: &str) {
        let cached = self.cached(&CacheKey::Identifier(identifier.to_string())).await;
        if let Some(provider) = cached {
            self.forget(provider.id, &[identifier]).await;
        }
    }

    pub async fn get_translation(
        &self,
        identifier: &str,
        language: &LanguageTag,
    ) -> Result<TranslatedProvider, CatalogError> {
        let provider = self.get_by_identifier(identifier).await?;
        Ok(provider.get_translation(language))
    }
}

fn same_operation(a: &Operation, b: &Operation) -> bool {
    a.name == b.name
        && a.description == b.description
        && a.category == b.category
        && a.required_permissions == b.required_permissions
        && a.parameters == b.parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::domain::fixtures::{operation, provider};
    use crate::events::BroadcastPublisher;
    use crate::repositories::{
        DbOperationRepository, DbProviderRepository, DbTranslationRepository, TranslationRecord,
        TranslationRepository,
    };
    use async_trait::async_trait;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, DatabaseConnection};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct CountingTranslations {
        inner: DbTranslationRepository,
        finds: AtomicUsize,
    }

    #[async_trait]
    impl TranslationRepository for CountingTranslations {
        async fn find(&self, identifier: &str, language_code: &str) -> anyhow::Result<Option<TranslationRecord>> {
            self.finds.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.find(identifier, language_code).await
        }

        async fn upsert(&self, identifier: &str, language_code: &str, payload: &str) -> anyhow::Result<()> {
            self.inner.upsert(identifier, language_code, payload).await
        }
    }

    struct Harness {
        db: Arc<DatabaseConnection>,
        catalog: ProviderCatalog,
        translations: Arc<TranslationStore>,
        repository: Arc<CountingTranslations>,
        events: Arc<BroadcastPublisher>,
    }

    impl Harness {
        async fn new() -> Self {
            let db = Database::connect("sqlite::memory:").await.unwrap();
            Migrator::up(&db, None).await.unwrap();
            let db = Arc::new(db);
            let repository = Arc::new(CountingTranslations {
                inner: DbTranslationRepository::new(db.clone()),
                finds: AtomicUsize::new(0),
            });
            let translations = Arc::new(TranslationStore::new(
                repository.clone(),
                NonZeroUsize::new(16).unwrap(),
                Duration::from_secs(3600),
            ));
            let events = Arc::new(BroadcastPublisher::new(64));
            let catalog = Self::catalog_over(&db, translations.clone(), events.clone());
            Self {
                db,
                catalog,
                translations,
                repository,
                events,
            }
        }

        fn catalog_over(
            db: &Arc<DatabaseConnection>,
            translations: Arc<TranslationStore>,
            events: Arc<BroadcastPublisher>,
        ) -> ProviderCatalog {
            ProviderCatalog::new(
                Arc::new(DbProviderRepository::new(db.clone())),
                Arc::new(DbOperationRepository::new(db.clone())),
                translations,
                events,
                NonZeroUsize::new(8).unwrap(),
            )
        }

        /// A second catalog over the same database with a cold cache.
        fn fresh_catalog(&self) -> ProviderCatalog {
            Self::catalog_over(&self.db, self.translations.clone(), self.events.clone())
        }

        fn finds(&self) -> usize {
            self.repository.finds.load(AtomicOrdering::SeqCst)
        }
    }

    fn drain(receiver: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn types(events: &[Event]) -> Vec<EventType> {
        events.iter().map(|event| event.event_type).collect()
    }

    #[tokio::test]
    async fn synced_tags_survive_a_fresh_fetch() {
        let harness = Harness::new().await;
        let created = harness.catalog.create(provider("github")).await.unwrap();

        let synced = harness
            .catalog
            .sync_tags_to_provider(
                created.id,
                ["vcs", "code", "vcs", "  "].map(String::from),
            )
            .await
            .unwrap();
        let expected: BTreeSet<String> = ["code", "vcs"].map(String::from).into_iter().collect();
        assert_eq!(synced.tags, expected);

        let by_identifier = harness.catalog.get_by_identifier("github").await.unwrap();
        assert_eq!(by_identifier.tags, expected);

        let fetched = harness.fresh_catalog().get_by_id(created.id).await.unwrap();
        assert_eq!(fetched.tags, expected);
        assert_eq!(fetched.permissions, created.permissions);

        let err = harness
            .catalog
            .sync_tags_to_provider(Uuid::new_v4(), vec!["x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_invalidates_both_cache_keys() {
        let harness = Harness::new().await;
        let created = harness.catalog.create(provider("github")).await.unwrap();
        harness.catalog.get_by_id(created.id).await.unwrap();
        harness.catalog.get_by_identifier("github").await.unwrap();

        let mut renamed = (*created).clone();
        renamed.identifier = "github_v2".to_string();
        renamed.name = "GitHub v2".to_string();
        harness.catalog.update(renamed).await.unwrap();

        assert_eq!(harness.catalog.get_by_id(created.id).await.unwrap().name, "GitHub v2");
        assert_eq!(
            harness.catalog.get_by_identifier("github_v2").await.unwrap().id,
            created.id
        );
        assert!(matches!(
            harness.catalog.get_by_identifier("github").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_providers_disappear_from_reads_and_listings() {
        let harness = Harness::new().await;
        let created = harness.catalog.create(provider("github")).await.unwrap();
        harness.catalog.create(provider("gitlab")).await.unwrap();
        harness.catalog.get_by_identifier("github").await.unwrap();

        harness.catalog.delete(created.id).await.unwrap();

        assert!(matches!(
            harness.catalog.get_by_id(created.id).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            harness.catalog.get_by_identifier("github").await,
            Err(CatalogError::NotFound(_))
        ));
        let page = harness.catalog.list(&ProviderQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].identifier, "gitlab");

        assert!(matches!(
            harness.catalog.delete(created.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn writes_emit_provider_and_operation_events() {
        let harness = Harness::new().await;
        let mut receiver = harness.events.subscribe();

        let created = harness.catalog.create(provider("github")).await.unwrap();
        let events = drain(&mut receiver);
        assert_eq!(
            types(&events),
            vec![EventType::ProviderCreated, EventType::OperationCreated]
        );
        assert_eq!(events[0].payload["identifier"], "github");
        assert_eq!(events[1].metadata.operation.as_deref(), Some("list_items"));

        let mut changed = (*created).clone();
        changed.operations = vec![operation(created.id, "create_item", Vec::new())];
        harness.catalog.update(changed).await.unwrap();
        let events = drain(&mut receiver);
        assert_eq!(
            types(&events),
            vec![
                EventType::ProviderUpdated,
                EventType::OperationCreated,
                EventType::OperationDeleted
            ]
        );
        assert_eq!(events[1].payload["identifier"], "create_item");
        assert_eq!(events[2].payload["identifier"], "list_items");

        let mut renamed = (*harness.catalog.get_by_id(created.id).await.unwrap()).clone();
        renamed.name = "GitHub".to_string();
        harness.catalog.update(renamed).await.unwrap();
        assert_eq!(types(&drain(&mut receiver)), vec![EventType::ProviderUpdated]);

        harness.catalog.delete(created.id).await.unwrap();
        let events = drain(&mut receiver);
        assert_eq!(types(&events), vec![EventType::ProviderDeleted]);
        assert_eq!(events[0].metadata.provider_identifier.as_deref(), Some("github"));
    }

    #[tokio::test]
    async fn listing_filters_before_paging() {
        let harness = Harness::new().await;
        for identifier in ["alpha", "beta", "gamma"] {
            harness.catalog.create(provider(identifier)).await.unwrap();
        }
        let mut legacy = provider("legacy");
        legacy.status = ProviderStatus::Deprecated;
        harness.catalog.create(legacy).await.unwrap();

        let query = ProviderQuery {
            listed_only: true,
            sort: SortField::Identifier,
            order: SortOrder::Desc,
            page_size: 2,
            ..Default::default()
        };
        let first = harness.catalog.list(&query).await.unwrap();
        assert_eq!(first.total, 3);
        let identifiers: Vec<&str> = first.items.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["gamma", "beta"]);

        let second = harness
            .catalog
            .list(&ProviderQuery { page: 2, ..query.clone() })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].identifier, "alpha");

        let everything = harness
            .catalog
            .list(&ProviderQuery {
                page_size: 500,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(everything.page_size, MAX_PAGE_SIZE);
        assert_eq!(everything.total, 4);
    }

    #[tokio::test]
    async fn rehydration_reads_translations_from_the_cache() {
        let harness = Harness::new().await;
        harness
            .translations
            .store_translation("github", "zh-CN", &json!({"name": "代码托管"}))
            .await
            .unwrap();
        harness.catalog.create(provider("github")).await.unwrap();
        let after_first_load = harness.finds();
        assert_eq!(after_first_load, SUPPORTED_LANGUAGES.len());

        harness.catalog.invalidate("github").await;
        let provider = harness.catalog.get_by_identifier("github").await.unwrap();
        harness.fresh_catalog().get_by_identifier("github").await.unwrap();

        assert_eq!(harness.finds(), after_first_load);
        let zh = LanguageTag::parse("zh-CN").unwrap();
        assert_eq!(provider.get_translation(&zh).name, "代码托管");
    }
}
