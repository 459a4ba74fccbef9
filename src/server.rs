//! # Server Configuration
//!
//! Router construction, shared application state, background loops, and
//! graceful shutdown for the webinar sync service.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::export_retry::ExportRetryManager;
use crate::handlers;
use crate::monitor::{InMemoryMonitorStore, SyncMonitor};
use crate::orchestrator::SyncOrchestrator;
use crate::recovery::RecoveryService;
use crate::remote::RemoteWorkerClient;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub monitor: Arc<SyncMonitor>,
    pub recovery: Arc<RecoveryService>,
}

impl AppState {
    /// Wire up the orchestrator, monitor, and recovery service
    pub fn build(config: &AppConfig, db: DatabaseConnection) -> Result<Self, crate::error::ApiError> {
        let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), config)?);
        let remote = config
            .remote_worker_base
            .as_deref()
            .map(|base| RemoteWorkerClient::new(base, config.sync.remote_timeout_seconds));
        let monitor = Arc::new(SyncMonitor::new(
            db.clone(),
            remote,
            config.monitor.clone(),
            Arc::new(InMemoryMonitorStore::default()),
        ));
        let recovery = Arc::new(RecoveryService::new(db.clone(), config.recovery.clone()));

        Ok(Self {
            db,
            orchestrator,
            monitor,
            recovery,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/syncs", post(handlers::syncs::start_sync))
        .route(
            "/syncs/{attempt_id}/progress",
            get(handlers::syncs::get_progress),
        )
        .route(
            "/syncs/{attempt_id}/cancel",
            post(handlers::syncs::cancel_sync),
        )
        .route(
            "/connections/{id}/force-cleanup",
            post(handlers::connections::force_cleanup),
        )
        .route(
            "/connections/{id}/attempts/active",
            get(handlers::connections::list_active_attempts),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server and its background loops with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::build(&config, db.clone())
        .map_err(|e| format!("Failed to build application state: {}", e.message))?;
    let app = create_app(state);

    let shutdown = CancellationToken::new();
    let recovery_handle = tokio::spawn(
        RecoveryService::new(db.clone(), config.recovery.clone()).run(shutdown.clone()),
    );
    let export_retry_handle = tokio::spawn(
        ExportRetryManager::new(db.clone(), config.export_retry.clone()).run(shutdown.clone()),
    );

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the background loops and wait for both to drain.
    shutdown.cancel();
    if let Err(err) = recovery_handle.await {
        warn!(error = ?err, "Recovery loop did not shut down cleanly");
    }
    if let Err(err) = export_retry_handle.await {
        warn!(error = ?err, "Export retry loop did not shut down cleanly");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::syncs::start_sync,
        crate::handlers::syncs::get_progress,
        crate::handlers::syncs::cancel_sync,
        crate::handlers::connections::force_cleanup,
        crate::handlers::connections::list_active_attempts,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::syncs::StartSyncRequest,
            crate::handlers::syncs::StartSyncResponse,
            crate::handlers::syncs::CancelSyncRequest,
            crate::handlers::syncs::CancelSyncResponse,
            crate::handlers::syncs::AttemptInfo,
            crate::handlers::connections::ForceCleanupResponse,
            crate::handlers::connections::ActiveAttemptsResponse,
            crate::monitor::ProgressSnapshot,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Websync API",
        description = "Webinar attendance synchronization service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
