//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Calbridge API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::AdapterRegistry;
use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::db;
use crate::handlers;
use crate::repositories::{IntegrationRepository, SecurityEventRepository};
use crate::telemetry;
use crate::token_refresh::RefreshCoordinator;
use crate::token_store::TokenStore;
use crate::webhook::WebhookValidator;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub registry: AdapterRegistry,
    pub token_store: Arc<TokenStore>,
    pub integrations: IntegrationRepository,
    pub security_events: SecurityEventRepository,
    pub validator: Arc<WebhookValidator>,
    pub refresh: Arc<RefreshCoordinator>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    // Webhooks authenticate through signature verification inside the
    // validator, never through operator tokens.
    let public = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/webhooks/{provider}", post(handlers::webhooks::receive));

    let protected = Router::new()
        .route(
            "/providers/{provider}/authorize",
            get(handlers::connect::authorize),
        )
        .route(
            "/providers/{provider}/callback",
            post(handlers::connect::callback),
        )
        .route("/integrations", get(handlers::integrations::list))
        .route(
            "/integrations/{id}",
            get(handlers::integrations::get).delete(handlers::integrations::disconnect),
        )
        .route(
            "/integrations/{id}/refresh",
            post(handlers::integrations::refresh),
        )
        .route(
            "/security-events",
            get(handlers::webhooks::list_security_events),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    public
        .merge(protected)
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Builds the shared application state from configuration.
pub async fn build_state(config: Arc<AppConfig>) -> Result<AppState, Box<dyn std::error::Error>> {
    let db = Arc::new(db::init_pool(&config).await?);
    migration::Migrator::up(db.as_ref(), None).await?;

    let integrations = IntegrationRepository::new(Arc::clone(&db));
    let security_events = SecurityEventRepository::new(Arc::clone(&db));

    let master_secret = config
        .master_secret
        .clone()
        .ok_or("CALBRIDGE_MASTER_SECRET is required")?;
    let token_store = Arc::new(TokenStore::new(integrations.clone(), master_secret));

    let registry = AdapterRegistry::from_config(&config);
    let validator = Arc::new(WebhookValidator::from_config(Arc::clone(&config))?);

    let refresh = Arc::new(RefreshCoordinator::new(
        Arc::clone(&config),
        integrations.clone(),
        Arc::clone(&token_store),
        registry.clone(),
        security_events.clone(),
    ));

    Ok(AppState {
        config,
        db,
        registry,
        token_store,
        integrations,
        security_events,
        validator,
        refresh,
    })
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let state = build_state(Arc::clone(&config)).await?;

    let shutdown = CancellationToken::new();
    let coordinator = Arc::clone(&state.refresh);
    let coordinator_shutdown = shutdown.clone();
    let coordinator_task = tokio::spawn(async move {
        coordinator.run(coordinator_shutdown).await;
    });

    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    coordinator_task.await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = ?e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connect::authorize,
        crate::handlers::connect::callback,
        crate::handlers::integrations::list,
        crate::handlers::integrations::get,
        crate::handlers::integrations::disconnect,
        crate::handlers::integrations::refresh,
        crate::handlers::webhooks::receive,
        crate::handlers::webhooks::list_security_events,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::connect::AuthorizeUrlResponse,
            crate::handlers::connect::CallbackRequest,
            crate::handlers::integrations::IntegrationResponse,
            crate::handlers::webhooks::WebhookAcceptResponse,
            crate::handlers::webhooks::SecurityEventResponse,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Calbridge API",
        description = "OAuth token lifecycle and webhook security for calendar providers",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
