//! # Tests for Handlers
//!
//! Unit tests for the API handlers, run against an in-memory database.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::handlers::{self, syncs};
use crate::repositories::ConnectionRepository;
use crate::server::AppState;

async fn test_state() -> AppState {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("create in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");

    let mut config = AppConfig::default();
    // Unroutable local endpoint; direct syncs fail fast without network.
    config.provider_api_base = "http://127.0.0.1:9".to_string();
    AppState::build(&config, db).expect("build state")
}

#[tokio::test]
async fn root_returns_service_info() {
    let Json(info) = handlers::root().await;
    assert_eq!(info.service, "websync");
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn healthz_reports_ok_with_live_database() {
    let state = test_state().await;
    let response = handlers::healthz(State(state)).await.expect("healthy");
    assert_eq!(response.0.status, "ok");
}

#[tokio::test]
async fn start_sync_rejects_unknown_sync_type() {
    let state = test_state().await;
    let body = syncs::StartSyncRequest {
        connection_id: Uuid::new_v4(),
        sync_type: Some("hourly".to_string()),
    };

    let err = syncs::start_sync(State(state), Json(body))
        .await
        .expect_err("invalid sync_type");
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
}

#[tokio::test]
async fn start_sync_returns_404_for_missing_connection() {
    let state = test_state().await;
    let body = syncs::StartSyncRequest {
        connection_id: Uuid::new_v4(),
        sync_type: None,
    };

    let err = syncs::start_sync(State(state), Json(body))
        .await
        .expect_err("missing connection");
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_sync_accepts_and_creates_attempt() {
    let state = test_state().await;
    let connection = ConnectionRepository::new(state.db.clone())
        .create("Acme", "salt", None)
        .await
        .expect("create connection");

    let body = syncs::StartSyncRequest {
        connection_id: connection.id,
        sync_type: None,
    };
    let (status, Json(response)) = syncs::start_sync(State(state.clone()), Json(body))
        .await
        .expect("start sync");

    assert_eq!(status, StatusCode::ACCEPTED);

    let attempt = crate::repositories::SyncAttemptRepository::new(state.db.clone())
        .find_by_id(response.attempt_id)
        .await
        .expect("find attempt")
        .expect("attempt row exists");
    assert_eq!(attempt.connection_id, connection.id);
    assert_eq!(attempt.execution_path, "direct");
}

#[tokio::test]
async fn force_cleanup_returns_404_for_missing_connection() {
    let state = test_state().await;
    let err = handlers::connections::force_cleanup(State(state), Path(Uuid::new_v4()))
        .await
        .expect_err("missing connection");
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn active_attempts_listing_is_empty_for_idle_connection() {
    let state = test_state().await;
    let connection = ConnectionRepository::new(state.db.clone())
        .create("Acme", "salt", None)
        .await
        .expect("create connection");

    let Json(response) =
        handlers::connections::list_active_attempts(State(state), Path(connection.id))
            .await
            .expect("list attempts");
    assert!(response.attempts.is_empty());
}
