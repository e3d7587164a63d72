//! Invocation pipeline
//!
//! One call to [`InvocationService::invoke_operation`] resolves the provider,
//! the adapter and the caller's credential (refreshing an expiring OAuth
//! token under a per-user lock), records a pending invocation, executes the
//! operation and completes the record exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::{Value, json};
use tracing::instrument;
use uuid::Uuid;

use crate::cache::{Cache, CacheError};
use crate::config::AppConfig;
use crate::contracts::{
    AdapterContract, ContractError, CredentialContract, CredentialDto, OAuthTokenDto,
    ProviderContract,
};
use crate::error::ErrorKind;
use crate::events::{Event, EventMetadata, EventPublisher, EventType, publish_best_effort};
use crate::i18n::LanguageTag;
use crate::repositories::InvocationRepository;

use super::breaker::CircuitBreaker;
use super::model::Invocation;

pub const DEFAULT_LIST_LIMIT: u64 = 20;
pub const MAX_LIST_LIMIT: u64 = 100;

const CANCELED_MESSAGE: &str = "invocation canceled";
const RATE_WINDOW_SECONDS: i64 = 60;

/// Tunables for the invocation pipeline.
#[derive(Debug, Clone)]
pub struct InvocationSettings {
    /// Calls per user and provider per minute, 0 disables the limit
    pub rate_limit_per_minute: u32,
    pub lock_timeout: Duration,
    pub lock_ttl: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl InvocationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            rate_limit_per_minute: config.invocation.rate_limit_per_minute,
            lock_timeout: config.oauth.lock_timeout(),
            lock_ttl: config.oauth.lock_ttl(),
            breaker_failure_threshold: config.invocation.breaker_failure_threshold,
            breaker_cooldown: config.invocation.breaker_cooldown(),
        }
    }
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Collaborators of the invocation service.
#[derive(Clone)]
pub struct InvocationDeps {
    pub providers: Arc<dyn ProviderContract>,
    pub credentials: Arc<dyn CredentialContract>,
    pub adapters: Arc<dyn AdapterContract>,
    pub repository: Arc<dyn InvocationRepository>,
    pub cache: Arc<dyn Cache>,
    pub events: Arc<dyn EventPublisher>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationPage {
    pub items: Vec<Invocation>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

pub fn token_lock_key(provider_identifier: &str, user_id: Uuid) -> String {
    format!("access_token_lock:{provider_identifier}:{user_id}")
}

fn persistence_error(error: anyhow::Error) -> ContractError {
    tracing::error!(error = ?error, "Invocation persistence failure");
    ContractError::internal("failed to persist invocation")
}

fn cache_error(error: CacheError) -> ContractError {
    tracing::error!(%error, "Cache failure during invocation");
    ContractError::internal("cache unavailable")
}

fn event_metadata(invocation: &Invocation) -> EventMetadata {
    EventMetadata::current()
        .with_user(invocation.user_id)
        .with_provider(invocation.provider_identifier.clone())
        .with_operation(invocation.operation_identifier.clone())
        .with_property("invocation_id", invocation.id.to_string())
}

fn event_payload(invocation: &Invocation) -> Value {
    json!({
        "id": invocation.id,
        "user_id": invocation.user_id,
        "provider_identifier": invocation.provider_identifier,
        "operation_identifier": invocation.operation_identifier,
        "status": invocation.status,
        "error_message": invocation.error_message,
        "started_at": invocation.started_at,
        "completed_at": invocation.completed_at,
        "duration_ms": invocation.duration_ms,
    })
}

fn is_upstream_failure(error: &ContractError) -> bool {
    matches!(
        error.root_kind(),
        ErrorKind::ProviderApiError | ErrorKind::AdapterExecuteFailed
    )
}

/// Completes a still-pending invocation as canceled when the task driving
/// it is dropped before reaching a terminal state.
struct CancelGuard {
    invocation: Option<Invocation>,
    metadata: EventMetadata,
    repository: Arc<dyn InvocationRepository>,
    events: Arc<dyn EventPublisher>,
    breaker: Arc<CircuitBreaker>,
}

impl CancelGuard {
    fn disarm(mut self) {
        self.invocation = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let Some(mut invocation) = self.invocation.take() else {
            return;
        };
        self.breaker.record_neutral(&invocation.provider_identifier);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(invocation_id = %invocation.id, "Invocation dropped outside a runtime; left pending");
            return;
        };
        let repository = self.repository.clone();
        let events = self.events.clone();
        let metadata = std::mem::take(&mut self.metadata);
        handle.spawn(async move {
            if invocation.mark_failed(CANCELED_MESSAGE).is_err() {
                return;
            }
            if let Err(error) = repository.complete(&invocation).await {
                tracing::warn!(invocation_id = %invocation.id, error = ?error, "Failed to record canceled invocation");
                return;
            }
            counter!("gateway_invocations_total",
                "provider" => invocation.provider_identifier.clone(),
                "status" => "canceled")
            .increment(1);
            let event = Event::new(EventType::InvocationCanceled, metadata, event_payload(&invocation));
            publish_best_effort(events.as_ref(), event).await;
        });
    }
}

pub struct InvocationService {
    deps: InvocationDeps,
    settings: InvocationSettings,
    breaker: Arc<CircuitBreaker>,
}

impl InvocationService {
    pub fn new(deps: InvocationDeps, settings: InvocationSettings) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            settings.breaker_failure_threshold,
            settings.breaker_cooldown,
        ));
        Self {
            deps,
            settings,
            breaker,
        }
    }

    /// Runs `operation_identifier` on behalf of `user_id` and returns the
    /// completed invocation. Adapter failures are returned wrapped in
    /// `ADAPTER_EXECUTE_FAILED` after the record has been marked failed.
    #[instrument(
        name = "InvocationService.invoke_operation",
        skip(self, parameters),
        fields(
            user_id = %user_id,
            provider = %provider_identifier,
            operation = %operation_identifier,
            invocation_id = tracing::field::Empty
        )
    )]
    pub async fn invoke_operation(
        &self,
        user_id: Uuid,
        provider_identifier: &str,
        operation_identifier: &str,
        parameters: Value,
    ) -> Result<Invocation, ContractError> {
        self.check_rate_limit(user_id, provider_identifier).await?;

        self.deps
            .providers
            .get_provider(provider_identifier, &LanguageTag::english())
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => ContractError::new(
                    ErrorKind::ProviderNotFound,
                    format!("provider '{provider_identifier}' not found"),
                ),
                _ => err,
            })?;

        let info = self.deps.adapters.adapter_info(provider_identifier).await?;
        let credential = self
            .resolve_credential(user_id, provider_identifier, &info.auth_type)
            .await?;

        if let Err(retry_after) = self.breaker.admit(provider_identifier) {
            return Err(ContractError::new(
                ErrorKind::CircuitOpen,
                format!("provider '{provider_identifier}' is temporarily unavailable"),
            )
            .with_retry_after(retry_after.as_secs().max(1)));
        }

        let invocation = Invocation::start(
            user_id,
            provider_identifier,
            operation_identifier,
            parameters.clone(),
        );
        if let Err(error) = self.deps.repository.create(&invocation).await {
            self.breaker.record_neutral(provider_identifier);
            return Err(persistence_error(error));
        }
        tracing::Span::current().record("invocation_id", tracing::field::display(invocation.id));

        let guard = CancelGuard {
            invocation: Some(invocation.clone()),
            metadata: event_metadata(&invocation),
            repository: self.deps.repository.clone(),
            events: self.deps.events.clone(),
            breaker: self.breaker.clone(),
        };
        self.emit(EventType::InvocationStarted, &invocation).await;

        let started = Instant::now();
        let outcome = self
            .deps
            .adapters
            .execute(provider_identifier, operation_identifier, parameters, credential)
            .await;

        let result = self.finish(invocation, outcome, &info.auth_type).await;
        guard.disarm();
        histogram!("gateway_invocation_duration_ms").record(started.elapsed().as_millis() as f64);
        result
    }

    async fn finish(
        &self,
        mut invocation: Invocation,
        outcome: Result<Value, ContractError>,
        auth_type: &str,
    ) -> Result<Invocation, ContractError> {
        let provider = invocation.provider_identifier.clone();
        match outcome {
            Ok(value) => {
                self.breaker.record_success(&provider);
                let bytes = serde_json::to_vec(&value).map_err(|err| {
                    ContractError::internal(format!("failed to encode adapter response: {err}"))
                })?;
                invocation
                    .mark_success(bytes)
                    .map_err(|err| ContractError::internal(err.to_string()))?;
                self.deps
                    .repository
                    .complete(&invocation)
                    .await
                    .map_err(persistence_error)?;
                counter!("gateway_invocations_total", "provider" => provider.clone(), "status" => "success")
                    .increment(1);
                self.emit(EventType::InvocationSuccess, &invocation).await;

                if auth_type != "none"
                    && let Err(error) = self
                        .deps
                        .credentials
                        .touch_last_used(invocation.user_id, &provider)
                        .await
                {
                    tracing::warn!(%error, "Failed to update credential last_used_at");
                }
                Ok(invocation)
            }
            Err(error) => {
                if is_upstream_failure(&error) {
                    self.breaker.record_failure(&provider);
                } else {
                    self.breaker.record_neutral(&provider);
                }
                tracing::warn!(%error, "Operation failed");
                invocation
                    .mark_failed(error.message())
                    .map_err(|err| ContractError::internal(err.to_string()))?;
                self.deps
                    .repository
                    .complete(&invocation)
                    .await
                    .map_err(persistence_error)?;
                counter!("gateway_invocations_total", "provider" => provider, "status" => "failed")
                    .increment(1);
                self.emit(EventType::InvocationFailed, &invocation).await;
                Err(ContractError::wrap(ErrorKind::AdapterExecuteFailed, error))
            }
        }
    }

    async fn emit(&self, event_type: EventType, invocation: &Invocation) {
        let event = Event::new(event_type, event_metadata(invocation), event_payload(invocation));
        publish_best_effort(self.deps.events.as_ref(), event).await;
    }

    async fn check_rate_limit(&self, user_id: Uuid, provider: &str) -> Result<(), ContractError> {
        let limit = self.settings.rate_limit_per_minute;
        if limit == 0 {
            return Ok(());
        }
        let now = Utc::now().timestamp();
        let window = now / RATE_WINDOW_SECONDS;
        let key = format!("rate:{user_id}:{provider}:{window}");
        let count = self
            .deps
            .cache
            .incr(&key, Duration::from_secs(RATE_WINDOW_SECONDS as u64))
            .await
            .map_err(cache_error)?;
        if count > i64::from(limit) {
            let retry_after = (RATE_WINDOW_SECONDS - now % RATE_WINDOW_SECONDS).max(1) as u64;
            return Err(ContractError::new(
                ErrorKind::RateLimited,
                format!("rate limit of {limit} calls per minute exceeded for provider '{provider}'"),
            )
            .with_retry_after(retry_after));
        }
        Ok(())
    }

    async fn resolve_credential(
        &self,
        user_id: Uuid,
        provider: &str,
        auth_type: &str,
    ) -> Result<CredentialDto, ContractError> {
        if auth_type == "none" {
            return self.deps.credentials.none_credential(user_id, provider).await;
        }
        match self.deps.credentials.get_credential(user_id, provider).await? {
            CredentialDto::OAuth(token) => self.refresh_if_needed(user_id, provider, token).await,
            other => Ok(other),
        }
    }

    #[instrument(name = "InvocationService.refresh_if_needed", skip(self, token))]
    async fn refresh_if_needed(
        &self,
        user_id: Uuid,
        provider: &str,
        token: OAuthTokenDto,
    ) -> Result<CredentialDto, ContractError> {
        if !self.deps.adapters.token_needs_refresh(provider, &token).await? {
            return Ok(CredentialDto::OAuth(token));
        }

        let key = token_lock_key(provider, user_id);
        let lock = self
            .deps
            .cache
            .acquire_lock(&key, self.settings.lock_ttl, self.settings.lock_timeout)
            .await
            .map_err(cache_error)?;
        let Some(lock) = lock else {
            counter!("gateway_token_refresh_total", "provider" => provider.to_string(), "outcome" => "contended")
                .increment(1);
            return Err(ContractError::new(
                ErrorKind::RateLimited,
                "token refresh in progress, please try again later",
            )
            .with_retry_after(1));
        };

        let result = self.refresh_locked(user_id, provider).await;

        match self.deps.cache.release_lock(&key, &lock).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(key, "Token lock expired before release"),
            Err(error) => tracing::warn!(key, %error, "Failed to release token lock"),
        }
        result
    }

    async fn refresh_locked(&self, user_id: Uuid, provider: &str) -> Result<CredentialDto, ContractError> {
        // Another holder may have refreshed while this task waited
        let token = match self.deps.credentials.get_credential(user_id, provider).await? {
            CredentialDto::OAuth(token) => token,
            other => return Ok(other),
        };
        if !self.deps.adapters.token_needs_refresh(provider, &token).await? {
            return Ok(CredentialDto::OAuth(token));
        }

        let refreshed = match self.deps.adapters.refresh_token(provider, &token).await {
            Ok(refreshed) => refreshed,
            Err(error) => {
                counter!("gateway_token_refresh_total", "provider" => provider.to_string(), "outcome" => "failed")
                    .increment(1);
                tracing::warn!(%error, "Token refresh failed");
                return Err(match error.kind() {
                    ErrorKind::AuthFailed => error,
                    _ => ContractError::wrap(ErrorKind::AuthFailed, error),
                });
            }
        };
        self.deps
            .credentials
            .replace_oauth_token(user_id, provider, &refreshed)
            .await?;
        counter!("gateway_token_refresh_total", "provider" => provider.to_string(), "outcome" => "refreshed")
            .increment(1);
        tracing::info!("Refreshed OAuth token");
        Ok(CredentialDto::OAuth(refreshed))
    }

    /// Newest first. `limit` defaults to 20 and is capped at 100.
    #[instrument(name = "InvocationService.list_for_user", skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<InvocationPage, ContractError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = offset.unwrap_or(0);
        let (items, total) = self
            .deps
            .repository
            .list_by_user(user_id, limit, offset)
            .await
            .map_err(persistence_error)?;
        Ok(InvocationPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// `FORBIDDEN` when the invocation belongs to another user.
    #[instrument(name = "InvocationService.get_for_user", skip(self))]
    pub async fn get_for_user(&self, user_id: Uuid, id: Uuid) -> Result<Invocation, ContractError> {
        let invocation = self
            .deps
            .repository
            .find_by_id(id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ContractError::new(ErrorKind::NotFound, format!("invocation {id} not found")))?;
        if invocation.user_id != user_id {
            return Err(ContractError::new(
                ErrorKind::Forbidden,
                "invocation belongs to another user",
            ));
        }
        Ok(invocation)
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use super::testing::MemoryInvocationRepository;
    use super::*;
    use crate::cache::MemoryCache;
    use crate::contracts::{
        AdapterInfoDto, AdapterStatusDto, CredentialSummaryDto, OperationDto, PermissionDto,
        ProviderDto, ProviderListQuery, ProviderPageDto, ProviderSummaryDto,
    };
    use crate::events::BroadcastPublisher;
    use crate::invocations::InvocationStatus;

    struct FakeProviders {
        known: Vec<String>,
    }

    #[async_trait]
    impl ProviderContract for FakeProviders {
        async fn get_provider(&self, identifier: &str, _: &LanguageTag) -> Result<ProviderDto, ContractError> {
            if !self.known.iter().any(|known| known == identifier) {
                return Err(ContractError::new(ErrorKind::NotFound, "missing"));
            }
            Ok(ProviderDto {
                summary: ProviderSummaryDto {
                    id: Uuid::new_v4(),
                    identifier: identifier.to_string(),
                    name: identifier.to_string(),
                    description: String::new(),
                    icon_url: None,
                    auth_type: "none".into(),
                    status: "active".into(),
                    categories: vec![],
                    tags: vec![],
                    api_doc_url: None,
                },
                language: "en".into(),
                permissions: vec![],
                operations: vec![],
            })
        }

        async fn list_providers(&self, _: &ProviderListQuery, _: &LanguageTag) -> Result<ProviderPageDto, ContractError> {
            unimplemented!()
        }

        async fn list_all(&self, _: &LanguageTag) -> Result<Vec<ProviderDto>, ContractError> {
            unimplemented!()
        }

        async fn categories(&self) -> Result<Vec<String>, ContractError> {
            unimplemented!()
        }

        async fn permissions_for_scopes(&self, _: &str, _: &[String]) -> Result<Vec<PermissionDto>, ContractError> {
            unimplemented!()
        }
    }

    #[derive(Default)]
    struct FakeCredentials {
        stored: Mutex<HashMap<(Uuid, String), CredentialDto>>,
        touched: AtomicUsize,
    }

    impl FakeCredentials {
        fn put(&self, user_id: Uuid, provider: &str, credential: CredentialDto) {
            self.stored
                .lock()
                .unwrap()
                .insert((user_id, provider.to_string()), credential);
        }

        fn token(&self, user_id: Uuid, provider: &str) -> Option<OAuthTokenDto> {
            match self.stored.lock().unwrap().get(&(user_id, provider.to_string())) {
                Some(CredentialDto::OAuth(token)) => Some(token.clone()),
                _ => None,
            }
        }
    }

    #[async_trait]
    impl CredentialContract for FakeCredentials {
        async fn get_credential(&self, user_id: Uuid, provider: &str) -> Result<CredentialDto, ContractError> {
            self.stored
                .lock()
                .unwrap()
                .get(&(user_id, provider.to_string()))
                .cloned()
                .ok_or_else(|| ContractError::new(ErrorKind::CredentialNotFound, "no credential"))
        }

        async fn none_credential(&self, _: Uuid, _: &str) -> Result<CredentialDto, ContractError> {
            Ok(CredentialDto::None)
        }

        async fn replace_oauth_token(&self, user_id: Uuid, provider: &str, token: &OAuthTokenDto) -> Result<(), ContractError> {
            self.put(user_id, provider, CredentialDto::OAuth(token.clone()));
            Ok(())
        }

        async fn touch_last_used(&self, _: Uuid, _: &str) -> Result<(), ContractError> {
            self.touched.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn store_credential(&self, _: Uuid, _: &str, _: CredentialDto) -> Result<CredentialSummaryDto, ContractError> {
            unimplemented!()
        }

        async fn describe_credential(&self, _: Uuid, _: &str) -> Result<CredentialSummaryDto, ContractError> {
            unimplemented!()
        }

        async fn delete_credential(&self, _: Uuid, _: &str) -> Result<(), ContractError> {
            unimplemented!()
        }
    }

    #[derive(Default)]
    struct FakeAdapters {
        auth_type: String,
        fail_with: Option<ErrorKind>,
        fail_refresh: bool,
        delay: Option<Duration>,
        refreshes: AtomicUsize,
        executions: Mutex<Vec<CredentialDto>>,
    }

    impl FakeAdapters {
        fn with_auth(auth_type: &str) -> Self {
            Self {
                auth_type: auth_type.to_string(),
                ..Default::default()
            }
        }

        fn executions(&self) -> Vec<CredentialDto> {
            self.executions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AdapterContract for FakeAdapters {
        async fn adapter_info(&self, identifier: &str) -> Result<AdapterInfoDto, ContractError> {
            Ok(AdapterInfoDto {
                identifier: identifier.to_string(),
                name: identifier.to_string(),
                description: String::new(),
                auth_type: self.auth_type.clone(),
                template: "mcp".into(),
            })
        }

        async fn list_operations(&self, _: &str) -> Result<Vec<OperationDto>, ContractError> {
            Ok(vec![])
        }

        async fn token_needs_refresh(&self, _: &str, token: &OAuthTokenDto) -> Result<bool, ContractError> {
            Ok(token.expiry.is_some_and(|expiry| expiry <= Utc::now()))
        }

        async fn refresh_token(&self, _: &str, token: &OAuthTokenDto) -> Result<OAuthTokenDto, ContractError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_refresh {
                return Err(ContractError::new(ErrorKind::AuthFailed, "invalid_grant"));
            }
            Ok(OAuthTokenDto {
                access_token: "fresh-token".into(),
                refresh_token: token.refresh_token.clone(),
                expiry: Some(Utc::now() + ChronoDuration::hours(1)),
                scopes: token.scopes.clone(),
            })
        }

        async fn execute(&self, _: &str, operation: &str, parameters: Value, credential: CredentialDto) -> Result<Value, ContractError> {
            self.executions.lock().unwrap().push(credential);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.fail_with {
                Some(kind) => Err(ContractError::new(kind, "upstream exploded")),
                None => Ok(json!({"operation": operation, "success": true, "content": [parameters]})),
            }
        }

        async fn adapter_statuses(&self) -> Vec<AdapterStatusDto> {
            vec![]
        }

        async fn reload_provider(&self, _: &str) -> Result<AdapterStatusDto, ContractError> {
            unimplemented!()
        }

        async fn reload_all(&self) -> Result<Vec<AdapterStatusDto>, ContractError> {
            unimplemented!()
        }
    }

    struct Harness {
        service: Arc<InvocationService>,
        credentials: Arc<FakeCredentials>,
        adapters: Arc<FakeAdapters>,
        repository: Arc<MemoryInvocationRepository>,
        cache: Arc<MemoryCache>,
        events: BroadcastPublisher,
    }

    fn harness(adapters: FakeAdapters, settings: InvocationSettings) -> Harness {
        let credentials = Arc::new(FakeCredentials::default());
        let adapters = Arc::new(adapters);
        let repository = Arc::new(MemoryInvocationRepository::default());
        let cache = Arc::new(MemoryCache::new());
        let events = BroadcastPublisher::new(64);
        let deps = InvocationDeps {
            providers: Arc::new(FakeProviders {
                known: vec!["filesystem".into(), "github".into()],
            }),
            credentials: credentials.clone(),
            adapters: adapters.clone(),
            repository: repository.clone(),
            cache: cache.clone(),
            events: Arc::new(events.clone()),
        };
        Harness {
            service: Arc::new(InvocationService::new(deps, settings)),
            credentials,
            adapters,
            repository,
            cache,
            events,
        }
    }

    fn stale_token() -> CredentialDto {
        CredentialDto::OAuth(OAuthTokenDto {
            access_token: "stale-token".into(),
            refresh_token: Some("refresh".into()),
            expiry: Some(Utc::now() - ChronoDuration::minutes(1)),
            scopes: vec!["repo".into()],
        })
    }

    #[tokio::test]
    async fn none_auth_invocation_succeeds_and_persists() {
        let h = harness(FakeAdapters::with_auth("none"), InvocationSettings::default());
        let mut events = h.events.subscribe();
        let user = Uuid::new_v4();

        let invocation = h
            .service
            .invoke_operation(user, "filesystem", "list_allowed_directories", json!({}))
            .await
            .unwrap();

        assert_eq!(invocation.status, InvocationStatus::Success);
        let stored = h.repository.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, InvocationStatus::Success);
        assert!(stored[0].completed_at.is_some());
        assert_eq!(
            stored[0].response_json().unwrap()["operation"],
            "list_allowed_directories"
        );
        assert_eq!(h.adapters.executions(), vec![CredentialDto::None]);

        assert_eq!(events.recv().await.unwrap().event_type, EventType::InvocationStarted);
        let done = events.recv().await.unwrap();
        assert_eq!(done.event_type, EventType::InvocationSuccess);
        assert_eq!(done.metadata.user_id, Some(user));
        assert_eq!(h.credentials.touched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_provider_fails_before_recording() {
        let h = harness(FakeAdapters::with_auth("none"), InvocationSettings::default());
        let err = h
            .service
            .invoke_operation(Uuid::new_v4(), "jira", "search", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderNotFound);
        assert!(h.repository.all().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_reported() {
        let h = harness(FakeAdapters::with_auth("apikey"), InvocationSettings::default());
        let err = h
            .service
            .invoke_operation(Uuid::new_v4(), "github", "list_repos", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialNotFound);
        assert!(h.repository.all().is_empty());
    }

    #[tokio::test]
    async fn stored_api_key_is_passed_and_touched() {
        let h = harness(FakeAdapters::with_auth("apikey"), InvocationSettings::default());
        let user = Uuid::new_v4();
        let key = CredentialDto::ApiKey {
            api_key: "sk-1".into(),
        };
        h.credentials.put(user, "github", key.clone());

        h.service
            .invoke_operation(user, "github", "list_repos", json!({}))
            .await
            .unwrap();
        assert_eq!(h.adapters.executions(), vec![key]);
        assert_eq!(h.credentials.touched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_once() {
        let h = harness(FakeAdapters::with_auth("oauth"), InvocationSettings::default());
        let user = Uuid::new_v4();
        h.credentials.put(user, "github", stale_token());

        h.service
            .invoke_operation(user, "github", "list_repos", json!({}))
            .await
            .unwrap();

        assert_eq!(h.adapters.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.credentials.token(user, "github").unwrap().access_token,
            "fresh-token"
        );
    }

    #[tokio::test]
    async fn concurrent_stale_invocations_refresh_once() {
        let h = harness(FakeAdapters::with_auth("oauth"), InvocationSettings::default());
        let user = Uuid::new_v4();
        h.credentials.put(user, "github", stale_token());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = h.service.clone();
                tokio::spawn(async move {
                    service
                        .invoke_operation(user, "github", "list_repos", json!({}))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.adapters.refreshes.load(Ordering::SeqCst), 1);
        let executions = h.adapters.executions();
        assert_eq!(executions.len(), 8);
        for credential in executions {
            let CredentialDto::OAuth(token) = credential else {
                panic!("expected oauth credential");
            };
            assert_eq!(token.access_token, "fresh-token");
        }
    }

    #[tokio::test]
    async fn refresh_failure_is_auth_failed_and_releases_lock() {
        let adapters = FakeAdapters {
            fail_refresh: true,
            ..FakeAdapters::with_auth("oauth")
        };
        let h = harness(adapters, InvocationSettings::default());
        let user = Uuid::new_v4();
        h.credentials.put(user, "github", stale_token());

        let err = h
            .service
            .invoke_operation(user, "github", "list_repos", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailed);
        assert!(h.repository.all().is_empty());

        let lock = h
            .cache
            .acquire_lock(&token_lock_key("github", user), Duration::from_secs(1), Duration::ZERO)
            .await
            .unwrap();
        assert!(lock.is_some());
    }

    #[tokio::test]
    async fn contended_lock_asks_caller_to_retry() {
        let settings = InvocationSettings {
            lock_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let h = harness(FakeAdapters::with_auth("oauth"), settings);
        let user = Uuid::new_v4();
        h.credentials.put(user, "github", stale_token());
        let _held = h
            .cache
            .acquire_lock(&token_lock_key("github", user), Duration::from_secs(30), Duration::ZERO)
            .await
            .unwrap()
            .unwrap();

        let err = h
            .service
            .invoke_operation(user, "github", "list_repos", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.message().contains("try again later"));
        assert_eq!(h.adapters.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn adapter_failure_marks_invocation_failed() {
        let adapters = FakeAdapters {
            fail_with: Some(ErrorKind::ProviderApiError),
            ..FakeAdapters::with_auth("none")
        };
        let h = harness(adapters, InvocationSettings::default());
        let mut events = h.events.subscribe();

        let err = h
            .service
            .invoke_operation(Uuid::new_v4(), "filesystem", "read_file", json!({"path": "/x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterExecuteFailed);
        assert_eq!(err.cause(), Some(ErrorKind::ProviderApiError));

        let stored = h.repository.all();
        assert_eq!(stored[0].status, InvocationStatus::Failed);
        assert_eq!(stored[0].error_message.as_deref(), Some("upstream exploded"));

        events.recv().await.unwrap();
        assert_eq!(events.recv().await.unwrap().event_type, EventType::InvocationFailed);
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_recording() {
        let settings = InvocationSettings {
            rate_limit_per_minute: 2,
            ..Default::default()
        };
        let h = harness(FakeAdapters::with_auth("none"), settings);
        let user = Uuid::new_v4();

        for _ in 0..2 {
            h.service
                .invoke_operation(user, "filesystem", "list_allowed_directories", json!({}))
                .await
                .unwrap();
        }
        let err = h
            .service
            .invoke_operation(user, "filesystem", "list_allowed_directories", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.retry_after().is_some());
        assert_eq!(h.repository.all().len(), 2);

        // Other users have their own window
        h.service
            .invoke_operation(Uuid::new_v4(), "filesystem", "list_allowed_directories", json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn breaker_opens_after_upstream_failures() {
        let adapters = FakeAdapters {
            fail_with: Some(ErrorKind::ProviderApiError),
            ..FakeAdapters::with_auth("none")
        };
        let settings = InvocationSettings {
            breaker_failure_threshold: 2,
            breaker_cooldown: Duration::from_secs(30),
            ..Default::default()
        };
        let h = harness(adapters, settings);
        let user = Uuid::new_v4();

        for _ in 0..2 {
            let err = h
                .service
                .invoke_operation(user, "filesystem", "read_file", json!({}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AdapterExecuteFailed);
        }
        let err = h
            .service
            .invoke_operation(user, "filesystem", "read_file", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircuitOpen);
        assert!(err.retry_after().is_some());
        assert_eq!(h.adapters.executions().len(), 2);
    }

    #[tokio::test]
    async fn invalid_parameters_do_not_trip_breaker() {
        let adapters = FakeAdapters {
            fail_with: Some(ErrorKind::InvalidParameters),
            ..FakeAdapters::with_auth("none")
        };
        let settings = InvocationSettings {
            breaker_failure_threshold: 1,
            ..Default::default()
        };
        let h = harness(adapters, settings);

        for _ in 0..3 {
            let err = h
                .service
                .invoke_operation(Uuid::new_v4(), "filesystem", "read_file", json!({}))
                .await
                .unwrap_err();
            assert_eq!(err.cause(), Some(ErrorKind::InvalidParameters));
        }
    }

    #[tokio::test]
    async fn dropped_invocation_is_completed_as_canceled() {
        let adapters = FakeAdapters {
            delay: Some(Duration::from_secs(30)),
            ..FakeAdapters::with_auth("none")
        };
        let h = harness(adapters, InvocationSettings::default());
        let mut events = h.events.subscribe();

        let service = h.service.clone();
        let task = tokio::spawn(async move {
            service
                .invoke_operation(Uuid::new_v4(), "filesystem", "read_file", json!({}))
                .await
        });
        assert_eq!(events.recv().await.unwrap().event_type, EventType::InvocationStarted);
        task.abort();

        let canceled = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(canceled.event_type, EventType::InvocationCanceled);

        let stored = h.repository.all();
        assert_eq!(stored[0].status, InvocationStatus::Failed);
        assert_eq!(stored[0].error_message.as_deref(), Some(CANCELED_MESSAGE));
    }

    #[tokio::test]
    async fn reads_are_scoped_to_the_owner() {
        let h = harness(FakeAdapters::with_auth("none"), InvocationSettings::default());
        let owner = Uuid::new_v4();
        let invocation = h
            .service
            .invoke_operation(owner, "filesystem", "list_allowed_directories", json!({}))
            .await
            .unwrap();

        assert_eq!(
            h.service.get_for_user(owner, invocation.id).await.unwrap().id,
            invocation.id
        );
        let err = h
            .service
            .get_for_user(Uuid::new_v4(), invocation.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = h
            .service
            .get_for_user(owner, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let page = h.service.list_for_user(owner, Some(500), None).await.unwrap();
        assert_eq!(page.limit, MAX_LIST_LIMIT);
        assert_eq!(page.total, 1);
        let page = h.service.list_for_user(owner, None, None).await.unwrap();
        assert_eq!(page.limit, DEFAULT_LIST_LIMIT);
    }
}
