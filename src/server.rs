//! # Server Configuration
//!
//! Router assembly, shared state and the HTTP serve loop.

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::repositories::{GithubRecordRepository, IntegrationRepository};
use crate::sync::{
    BroadcastPublisher, EventPublisher, FanoutPublisher, JobRunner, SyncOrchestrator,
    TracingPublisher,
};
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub records: GithubRecordRepository,
    pub integrations: IntegrationRepository,
    pub runner: JobRunner,
    /// Terminal job events for in-process subscribers
    pub events: BroadcastPublisher,
}

impl AppState {
    /// Wire repositories, orchestrator and job runner from config.
    pub fn new(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("crypto key is not configured"))?;
        let crypto_key =
            CryptoKey::new(key_bytes).map_err(|e| anyhow::anyhow!("invalid crypto key: {}", e))?;

        let db = Arc::new(db);
        let records = GithubRecordRepository::new(db.clone());
        let integrations = IntegrationRepository::new(db.clone(), crypto_key);
        let orchestrator = Arc::new(SyncOrchestrator::from_config(
            &config,
            records.clone(),
            integrations.clone(),
        ));

        let events = BroadcastPublisher::default();
        let publisher: Arc<dyn EventPublisher> = Arc::new(FanoutPublisher::new(vec![
            Arc::new(TracingPublisher) as Arc<dyn EventPublisher>,
            Arc::new(events.clone()),
        ]));
        let runner = JobRunner::new(orchestrator, publisher, config.sync.reject_concurrent);

        Ok(Self {
            config: Arc::new(config),
            db,
            records,
            integrations,
            runner,
            events,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/integration", get(handlers::integration::integrate))
        .route(
            "/integration/checkSyncStatus",
            get(handlers::integration::check_sync_status),
        )
        .route("/integration/events", get(handlers::integration::events))
        .route("/integration/logout", get(handlers::integration::logout))
        .route("/{resource}", get(handlers::records::list_records))
        .route(
            "/{resource}/textSearch",
            get(handlers::records::text_search),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

/// Serves until `shutdown` is cancelled or Ctrl-C is received.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();
    let mode = config.sync.mode;

    let state = AppState::new(config, db)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, ?mode, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                tracing::error!(%error, "Failed to listen for Ctrl-C");
                shutdown.cancelled().await;
            }
        }
    }
    tracing::info!("Shutdown requested");
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::integration::integrate,
        crate::handlers::integration::events,
        crate::handlers::integration::check_sync_status,
        crate::handlers::integration::logout,
        crate::handlers::records::list_records,
        crate::handlers::records::text_search,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::ResourceKind,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::types::PageMeta,
            crate::handlers::types::RecordView,
            crate::handlers::types::MessageResponse,
            crate::handlers::records::SearchResponse,
            crate::handlers::integration::SyncAccepted,
            crate::handlers::integration::SyncCompleted,
            crate::handlers::integration::SyncStatus,
            crate::sync::IntegrationSummary,
            crate::sync::SyncReport,
            crate::sync::SyncCounts,
            crate::sync::ResourceFailure,
            crate::sync::ParentContext,
            crate::sync::SyncEvent,
            crate::sync::SyncEventKind,
        )
    ),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "integration", description = "GitHub OAuth callback, job events, sync status and logout"),
        (name = "records", description = "Mirrored organizations, repositories, commits, issues and pull requests"),
    ),
    info(
        title = "GitHub Sync API",
        description = "Mirrors a user's GitHub organizations, repositories, commits, issues and pull requests",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
