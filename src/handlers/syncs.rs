//! # Sync API Handlers
//!
//! Start, progress, and cancel endpoints for sync attempts. Progress reads
//! run through the monitor, so polling this endpoint is what drives stuck
//! detection and auto-cancel.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::models::sync_attempt;
use crate::monitor::ProgressSnapshot;
use crate::server::AppState;

/// Request body for starting a sync
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartSyncRequest {
    /// Connection to sync
    #[schema(value_type = String, example = "550e8400-e29b-41d4-a716-446655440000")]
    pub connection_id: Uuid,
    /// Kind of sync being requested (default: manual)
    #[schema(example = "manual")]
    pub sync_type: Option<String>,
}

/// Response for a started sync
#[derive(Debug, Serialize, ToSchema)]
pub struct StartSyncResponse {
    /// Attempt row tracking this sync
    #[schema(value_type = String)]
    pub attempt_id: Uuid,
}

/// Request body for cancelling an attempt
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelSyncRequest {
    /// Optional operator-supplied reason recorded on the attempt
    pub reason: Option<String>,
}

/// Response for a cancel request
#[derive(Debug, Serialize, ToSchema)]
pub struct CancelSyncResponse {
    /// Whether this call performed the cancellation (false if the attempt
    /// was already terminal)
    pub cancelled: bool,
}

const SYNC_TYPES: &[&str] = &["manual", "incremental", "initial"];

/// Start a sync for a connection
#[utoipa::path(
    post,
    path = "/syncs",
    request_body = StartSyncRequest,
    responses(
        (status = 202, description = "Sync accepted", body = StartSyncResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "syncs"
)]
pub async fn start_sync(
    State(state): State<AppState>,
    Json(body): Json<StartSyncRequest>,
) -> Result<(StatusCode, Json<StartSyncResponse>), ApiError> {
    let sync_type = body.sync_type.as_deref().unwrap_or("manual");
    if !SYNC_TYPES.contains(&sync_type) {
        return Err(validation_error(
            "Invalid sync_type",
            serde_json::json!({
                "sync_type": format!("Must be one of: {}", SYNC_TYPES.join(", "))
            }),
        ));
    }

    let attempt_id = state
        .orchestrator
        .start_sync(body.connection_id, sync_type)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSyncResponse { attempt_id }),
    ))
}

/// Poll progress for an attempt
#[utoipa::path(
    get,
    path = "/syncs/{attempt_id}/progress",
    params(
        ("attempt_id" = String, Path, description = "Sync attempt ID (UUID)")
    ),
    responses(
        (status = 200, description = "Current progress", body = ProgressSnapshot),
        (status = 404, description = "Attempt not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "syncs"
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<ProgressSnapshot>, ApiError> {
    let snapshot = state.monitor.poll(attempt_id).await?;
    Ok(Json(snapshot))
}

/// Cancel a running attempt
#[utoipa::path(
    post,
    path = "/syncs/{attempt_id}/cancel",
    params(
        ("attempt_id" = String, Path, description = "Sync attempt ID (UUID)")
    ),
    request_body = CancelSyncRequest,
    responses(
        (status = 200, description = "Cancel outcome", body = CancelSyncResponse),
        (status = 404, description = "Attempt not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "syncs"
)]
pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    body: Option<Json<CancelSyncRequest>>,
) -> Result<Json<CancelSyncResponse>, ApiError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "Cancelled by user request".to_string());

    let cancelled = state
        .orchestrator
        .cancel_attempt(attempt_id, &reason)
        .await?;
    Ok(Json(CancelSyncResponse { cancelled }))
}

/// Attempt summary used by listing/debug responses
#[derive(Debug, Serialize, ToSchema)]
pub struct AttemptInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub connection_id: Uuid,
    pub sync_type: String,
    pub status: String,
    pub stage: String,
    pub execution_path: String,
    pub stage_progress_pct: i32,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl From<sync_attempt::Model> for AttemptInfo {
    fn from(model: sync_attempt::Model) -> Self {
        Self {
            id: model.id,
            connection_id: model.connection_id,
            sync_type: model.sync_type,
            status: model.status,
            stage: model.stage,
            execution_path: model.execution_path,
            stage_progress_pct: model.stage_progress_pct,
            started_at: model.started_at.to_rfc3339(),
            completed_at: model.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}
