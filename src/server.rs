//! # Server Configuration
//!
//! Wiring of the gateway services, the Axum router and the serve loop.

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::mcp::{McpConnector, StdioConnector};
use crate::adapters::{AdapterFacade, AdapterFactory, TemplateRegistry};
use crate::auth::auth_middleware;
use crate::cache::MemoryCache;
use crate::catalog::{CatalogFacade, ProviderCatalog};
use crate::config::AppConfig;
use crate::contracts::{AdapterContract, CredentialContract, ProviderContract};
use crate::credentials::{CredentialFacade, CredentialStore};
use crate::crypto::CryptoKey;
use crate::events::BroadcastPublisher;
use crate::handlers;
use crate::i18n::language_middleware;
use crate::invocations::{InvocationDeps, InvocationService, InvocationSettings};
use crate::repositories::{
    DbAdapterConfigRepository, DbCredentialRepository, DbInvocationRepository,
    DbOperationRepository, DbProviderRepository, DbTranslationRepository,
};
use crate::telemetry::trace_context_middleware;
use crate::translations::TranslationStore;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub providers: Arc<dyn ProviderContract>,
    pub credentials: Arc<dyn CredentialContract>,
    pub adapters: Arc<dyn AdapterContract>,
    pub invocations: Arc<InvocationService>,
}

/// Concrete services behind [`AppState`], kept for startup seeding.
pub struct Services {
    pub state: AppState,
    pub catalog: Arc<ProviderCatalog>,
    pub translations: Arc<TranslationStore>,
    pub adapter_configs: Arc<DbAdapterConfigRepository>,
    pub events: Arc<BroadcastPublisher>,
}

fn non_zero(value: usize, name: &str) -> anyhow::Result<NonZeroUsize> {
    NonZeroUsize::new(value).with_context(|| format!("{name} must be greater than zero"))
}

/// Builds every service over an open, migrated database.
pub fn build_services(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Services> {
    build_services_with_connector(config, db, Arc::new(StdioConnector))
}

/// [`build_services`] with the MCP transport supplied by the caller.
pub fn build_services_with_connector(
    config: AppConfig,
    db: DatabaseConnection,
    connector: Arc<dyn McpConnector>,
) -> anyhow::Result<Services> {
    let config = Arc::new(config);
    let db = Arc::new(db);
    let events = Arc::new(BroadcastPublisher::new(EVENT_CHANNEL_CAPACITY));

    let translations = Arc::new(TranslationStore::new(
        Arc::new(DbTranslationRepository::new(db.clone())),
        non_zero(config.catalog.translation_cache_capacity, "translation cache capacity")?,
        config.catalog.translation_ttl(),
    ));
    let catalog = Arc::new(ProviderCatalog::new(
        Arc::new(DbProviderRepository::new(db.clone())),
        Arc::new(DbOperationRepository::new(db.clone())),
        translations.clone(),
        events.clone(),
        non_zero(config.catalog.provider_cache_capacity, "provider cache capacity")?,
    ));

    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key is not configured")?;
    let key = CryptoKey::new(key_bytes).context("invalid crypto key")?;
    let credential_store = Arc::new(CredentialStore::new(
        Arc::new(DbCredentialRepository::new(db.clone())),
        key,
    ));

    let adapter_configs = Arc::new(DbAdapterConfigRepository::new(db.clone()));
    let registry = Arc::new(TemplateRegistry::with_defaults(
        connector,
        config.mcp.default_timeout(),
        config.oauth.expiry_skew(),
    ));
    let factory = Arc::new(AdapterFactory::new(registry, adapter_configs.clone()));

    let providers: Arc<dyn ProviderContract> = Arc::new(CatalogFacade::new(catalog.clone()));
    let credentials: Arc<dyn CredentialContract> =
        Arc::new(CredentialFacade::new(credential_store));
    let adapters: Arc<dyn AdapterContract> = Arc::new(AdapterFacade::new(factory));

    let invocations = Arc::new(InvocationService::new(
        InvocationDeps {
            providers: providers.clone(),
            credentials: credentials.clone(),
            adapters: adapters.clone(),
            repository: Arc::new(DbInvocationRepository::new(db.clone())),
            cache: Arc::new(MemoryCache::new()),
            events: events.clone(),
        },
        InvocationSettings::from_config(&config),
    ));

    Ok(Services {
        state: AppState {
            config,
            db,
            providers,
            credentials,
            adapters,
            invocations,
        },
        catalog,
        translations,
        adapter_configs,
        events,
    })
}

/// Loads provider directories into the database and builds their adapters.
pub async fn bootstrap_providers(services: &Services) -> anyhow::Result<()> {
    let dir = services.state.config.providers_dir.clone();
    let loaded = tokio::task::spawn_blocking(move || crate::loader::load_dir(&dir))
        .await
        .context("provider loader task failed")??;

    let report = crate::seeds::seed_providers(
        loaded,
        &services.catalog,
        &services.translations,
        &services.adapter_configs,
    )
    .await?;
    tracing::info!(
        created = report.created,
        updated = report.updated,
        failed = report.failed,
        "Providers seeded"
    );

    let statuses = services.state.adapters.reload_all().await?;
    for status in statuses.iter().filter(|status| !status.loaded) {
        tracing::warn!(
            provider = %status.identifier,
            error = status.error.as_deref().unwrap_or("unknown"),
            "Adapter not loaded"
        );
    }
    Ok(())
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/invocations", get(handlers::invocations::list_invocations))
        .route("/invocations/{id}", get(handlers::invocations::get_invocation))
        .route(
            "/invocations/{provider_identifier}/{operation_identifier}",
            post(handlers::invocations::invoke_operation),
        )
        .route("/mcp/list_tools", post(handlers::mcp::list_tools))
        .route(
            "/mcp/call_tool/{provider_identifier}/{operation_identifier}",
            post(handlers::mcp::call_tool),
        )
        .route(
            "/credentials/{provider_identifier}",
            put(handlers::credentials::store_credential)
                .get(handlers::credentials::get_credential)
                .delete(handlers::credentials::delete_credential),
        )
        .route("/adapters", get(handlers::adapters::list_adapters))
        .route(
            "/adapters/reload/{identifier}",
            post(handlers::adapters::reload_adapter),
        )
        .route(
            "/adapters/reload_all",
            post(handlers::adapters::reload_all_adapters),
        )
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/providers", get(handlers::providers::list_providers))
        .route("/providers/categories", get(handlers::providers::list_categories))
        .route("/providers/filter", post(handlers::providers::filter_providers))
        .route("/providers/{identifier}", get(handlers::providers::get_provider))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(language_middleware))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let db = crate::db::init_pool(&config).await?;
    crate::db::run_migrations(&db).await?;

    let services = build_services(config, db)?;
    bootstrap_providers(&services).await?;
    let app = create_app(services.state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %services.state.config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::providers::list_providers,
        crate::handlers::providers::list_categories,
        crate::handlers::providers::filter_providers,
        crate::handlers::providers::get_provider,
        crate::handlers::invocations::list_invocations,
        crate::handlers::invocations::get_invocation,
        crate::handlers::invocations::invoke_operation,
        crate::handlers::mcp::list_tools,
        crate::handlers::mcp::call_tool,
        crate::handlers::credentials::store_credential,
        crate::handlers::credentials::get_credential,
        crate::handlers::credentials::delete_credential,
        crate::handlers::adapters::list_adapters,
        crate::handlers::adapters::reload_adapter,
        crate::handlers::adapters::reload_all_adapters,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthStatus,
            crate::handlers::types::ErrorEnvelope,
            crate::handlers::types::ErrorData,
            crate::error::ErrorKind,
            crate::contracts::ProviderSummaryDto,
            crate::contracts::ProviderDto,
            crate::contracts::ProviderPageDto,
            crate::contracts::OperationDto,
            crate::contracts::ParameterDto,
            crate::contracts::PermissionDto,
            crate::contracts::CredentialSummaryDto,
            crate::contracts::AdapterStatusDto,
            crate::handlers::providers::FilterProvidersRequest,
            crate::handlers::invocations::InvocationView,
            crate::handlers::invocations::InvocationListResponse,
            crate::handlers::invocations::InvokeRequest,
            crate::handlers::mcp::ListToolsRequest,
            crate::handlers::mcp::ListToolsResponse,
            crate::handlers::mcp::CallToolResponse,
            crate::handlers::credentials::StoredCredentialResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "providers", description = "Translated provider catalog"),
        (name = "invocations", description = "Recorded operation invocations"),
        (name = "mcp", description = "MCP tool views"),
        (name = "credentials", description = "Per-user provider credentials"),
        (name = "adapters", description = "Adapter administration"),
    ),
    info(
        title = "Tool Gateway API",
        description = "Multi-tenant gateway invoking provider operations on behalf of end users",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
