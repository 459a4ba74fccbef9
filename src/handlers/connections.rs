//! # Connection API Handlers
//!
//! Operator endpoints scoped to a single connection: force-cleanup of
//! lingering attempts and listing the attempts currently active.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::syncs::AttemptInfo;
use crate::repositories::{ConnectionRepository, SyncAttemptRepository};
use crate::server::AppState;

/// Response for a force-cleanup request
#[derive(Debug, Serialize, ToSchema)]
pub struct ForceCleanupResponse {
    /// Number of attempts this call cancelled
    pub cancelled: usize,
}

/// Response for the active attempts listing
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveAttemptsResponse {
    pub attempts: Vec<AttemptInfo>,
}

/// Cancel every active attempt for a connection, stale or not.
///
/// Operator escape hatch for a connection wedged by attempts that never
/// reached a terminal state.
#[utoipa::path(
    post,
    path = "/connections/{id}/force-cleanup",
    params(
        ("id" = String, Path, description = "Connection ID (UUID)")
    ),
    responses(
        (status = 200, description = "Cleanup outcome", body = ForceCleanupResponse),
        (status = 404, description = "Connection not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn force_cleanup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ForceCleanupResponse>, ApiError> {
    ConnectionRepository::new(state.db.clone())
        .find_by_id(id)
        .await?
        .ok_or_else(|| crate::error::not_found("Connection not found"))?;

    let cancelled = state.recovery.force_cleanup(id).await?;
    Ok(Json(ForceCleanupResponse { cancelled }))
}

/// List the attempts currently active for a connection. Lets a restarted
/// monitor rediscover the attempt it was tracking.
#[utoipa::path(
    get,
    path = "/connections/{id}/attempts/active",
    params(
        ("id" = String, Path, description = "Connection ID (UUID)")
    ),
    responses(
        (status = 200, description = "Active attempts", body = ActiveAttemptsResponse),
        (status = 404, description = "Connection not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn list_active_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActiveAttemptsResponse>, ApiError> {
    ConnectionRepository::new(state.db.clone())
        .find_by_id(id)
        .await?
        .ok_or_else(|| crate::error::not_found("Connection not found"))?;

    let attempts = SyncAttemptRepository::new(state.db.clone())
        .find_active_for_connection(id)
        .await?
        .into_iter()
        .map(AttemptInfo::from)
        .collect();

    Ok(Json(ActiveAttemptsResponse { attempts }))
}
