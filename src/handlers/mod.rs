//! # API Handlers
//!
//! HTTP endpoint handlers for the webinar sync service.

use axum::response::Json;

use crate::db;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;
use axum::extract::State;
use serde::Serialize;
use utoipa::ToSchema;

pub mod connections;
pub mod syncs;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health check response payload
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service health
    #[schema(example = "ok")]
    pub status: &'static str,
}

/// Liveness/readiness probe backed by a database round-trip
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "health"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    db::health_check(&state.db)
        .await
        .map_err(|_| ApiError::from(crate::error::ErrorType::ServiceUnavailable))?;
    Ok(Json(HealthResponse { status: "ok" }))
}

#[cfg(test)]
mod tests;
