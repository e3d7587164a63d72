use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::i18n::LanguageTag;
use crate::repositories::TranslationRepository;

use super::{TranslationBundle, TranslationError, normalize_language_code};

type CacheKey = (String, &'static str);

/// A cached lookup. Misses are remembered too so that providers without a
/// given language do not hit the repository on every hydration.
struct CachedBundle {
    bundle: Option<Arc<TranslationBundle>>,
    loaded_at: Instant,
}

pub struct TranslationStore {
    repository: Arc<dyn TranslationRepository>,
    cache: Mutex<LruCache<CacheKey, CachedBundle>>,
    ttl: Duration,
}

impl TranslationStore {
    pub fn new(repository: Arc<dyn TranslationRepository>, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            repository,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Decoded bundle for the provider in the normalized language.
    pub async fn get_provider_translation(
        &self,
        identifier: &str,
        language_code: &str,
    ) -> Result<Arc<TranslationBundle>, TranslationError> {
        let language = normalize_language_code(language_code);
        let key = (identifier.to_string(), language);
        let not_found = || TranslationError::NotFound {
            identifier: identifier.to_string(),
            language: language.to_string(),
        };

        {
            let mut cache = self.cache.lock().await;
            match cache.get(&key) {
                Some(entry) if entry.loaded_at.elapsed() < self.ttl => {
                    return entry.bundle.clone().ok_or_else(not_found);
                }
                Some(_) => {
                    cache.pop(&key);
                }
                None => {}
            }
        }

        let record = self
            .repository
            .find(identifier, language)
            .await
            .map_err(TranslationError::Repository)?;
        let bundle = match record {
            Some(record) => Some(Arc::new(TranslationBundle::decode(&record.translations)?)),
            None => None,
        };

        self.cache.lock().await.put(
            key,
            CachedBundle {
                bundle: bundle.clone(),
                loaded_at: Instant::now(),
            },
        );
        bundle.ok_or_else(not_found)
    }

    /// Stores the payload in compact form under the supported language the
    /// code matches (`zh-HK` is stored as `zh-TW`) and drops any cached copy.
    pub async fn store_translation(
        &self,
        identifier: &str,
        language_code: &str,
        payload: &Value,
    ) -> Result<(), TranslationError> {
        let language = LanguageTag::parse(language_code)
            .ok_or_else(|| TranslationError::InvalidLanguage(language_code.to_string()))?
            .match_supported()
            .ok_or_else(|| TranslationError::UnsupportedLanguage(language_code.to_string()))?;
        let bundle: TranslationBundle =
            serde_json::from_value(payload.clone()).map_err(TranslationError::Decode)?;
        let compact = serde_json::to_string(&bundle).map_err(TranslationError::Decode)?;

        self.repository
            .upsert(identifier, language.as_str(), &compact)
            .await
            .map_err(TranslationError::Repository)?;

        self.invalidate(identifier).await;
        Ok(())
    }

    pub async fn invalidate(&self, identifier: &str) {
        let mut cache = self.cache.lock().await;
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|((id, _), _)| id == identifier)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::TranslationRecord;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryRepository {
        rows: std::sync::Mutex<HashMap<(String, String), String>>,
        finds: AtomicUsize,
    }

    #[async_trait]
    impl TranslationRepository for MemoryRepository {
        async fn find(&self, identifier: &str, language_code: &str) -> anyhow::Result<Option<TranslationRecord>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(&(identifier.to_string(), language_code.to_string()))
                .map(|payload| TranslationRecord {
                    provider_identifier: identifier.to_string(),
                    language_code: language_code.to_string(),
                    translations: payload.clone(),
                    updated_at: Utc::now(),
                }))
        }

        async fn upsert(&self, identifier: &str, language_code: &str, payload: &str) -> anyhow::Result<()> {
            self.rows.lock().unwrap().insert(
                (identifier.to_string(), language_code.to_string()),
                payload.to_string(),
            );
            Ok(())
        }
    }

    fn store(repository: Arc<MemoryRepository>, ttl: Duration) -> TranslationStore {
        TranslationStore::new(repository, NonZeroUsize::new(10).unwrap(), ttl)
    }

    #[tokio::test]
    async fn normalizes_language_and_caches_reads() {
        let repository = Arc::new(MemoryRepository::default());
        let store = store(repository.clone(), Duration::from_secs(3600));
        store
            .store_translation("github", "zh-CN", &json!({"name": "代码托管"}))
            .await
            .unwrap();

        let first = store.get_provider_translation("github", "zh-Hans").await.unwrap();
        let second = store.get_provider_translation("github", "zh_SG").await.unwrap();

        assert_eq!(first.name.as_deref(), Some("代码托管"));
        assert_eq!(first, second);
        assert_eq!(repository.finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_reloaded() {
        let repository = Arc::new(MemoryRepository::default());
        let store = store(repository.clone(), Duration::ZERO);
        store
            .store_translation("github", "en", &json!({"name": "GitHub"}))
            .await
            .unwrap();

        store.get_provider_translation("github", "en").await.unwrap();
        store.get_provider_translation("github", "en").await.unwrap();
        assert_eq!(repository.finds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_rows_are_typed_not_found() {
        let store = store(Arc::new(MemoryRepository::default()), Duration::from_secs(60));
        let err = store.get_provider_translation("github", "fr").await.unwrap_err();
        assert!(matches!(err, TranslationError::NotFound { ref language, .. } if language == "en"));
    }

    #[tokio::test]
    async fn regional_codes_are_stored_under_the_supported_language() {
        let repository = Arc::new(MemoryRepository::default());
        let store = store(repository.clone(), Duration::from_secs(3600));
        store
            .store_translation("github", "zh-HK", &json!({"name": "程式碼託管"}))
            .await
            .unwrap();

        assert!(
            repository
                .rows
                .lock()
                .unwrap()
                .contains_key(&("github".to_string(), "zh-TW".to_string()))
        );
        let bundle = store.get_provider_translation("github", "zh-HK").await.unwrap();
        assert_eq!(bundle.name.as_deref(), Some("程式碼託管"));

        let err = store
            .store_translation("github", "fr", &json!({"name": "Hébergement"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::UnsupportedLanguage(_)));
    }

    #[tokio::test]
    async fn misses_are_cached_until_a_write() {
        let repository = Arc::new(MemoryRepository::default());
        let store = store(repository.clone(), Duration::from_secs(3600));

        for _ in 0..2 {
            let err = store.get_provider_translation("github", "en").await.unwrap_err();
            assert!(matches!(err, TranslationError::NotFound { .. }));
        }
        assert_eq!(repository.finds.load(Ordering::SeqCst), 1);

        store
            .store_translation("github", "en", &json!({"name": "GitHub"}))
            .await
            .unwrap();
        let bundle = store.get_provider_translation("github", "en").await.unwrap();
        assert_eq!(bundle.name.as_deref(), Some("GitHub"));
    }

    #[tokio::test]
    async fn writes_invalidate_the_cache() {
        let repository = Arc::new(MemoryRepository::default());
        let store = store(repository, Duration::from_secs(3600));
        store
            .store_translation("github", "en", &json!({"name": "Old"}))
            .await
            .unwrap();
        store.get_provider_translation("github", "en").await.unwrap();

        store
            .store_translation("github", "en", &json!({"name": "New"}))
            .await
            .unwrap();
        let bundle = store.get_provider_translation("github", "en").await.unwrap();
        assert_eq!(bundle.name.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn rejects_invalid_language_codes() {
        let store = store(Arc::new(MemoryRepository::default()), Duration::from_secs(60));
        let err = store
            .store_translation("github", "not a tag", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidLanguage(_)));
    }
}
