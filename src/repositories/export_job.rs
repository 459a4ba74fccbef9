//! # ExportJob Repository
//!
//! Repository operations for the export_jobs table: creation, failure
//! recording with retry-history accumulation, requeue, and the dead-letter
//! transition.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::export_job::{
    ActiveModel, Column, Entity, Model, STATUS_FAILED, STATUS_PENDING, STATUS_PERMANENTLY_FAILED,
};

/// Repository for export job database operations
pub struct ExportJobRepository {
    db: DatabaseConnection,
}

impl ExportJobRepository {
    /// Create a new ExportJobRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new pending export job
    pub async fn create(
        &self,
        user_ref: Uuid,
        export_type: &str,
        config: Option<JsonValue>,
        max_retries: i32,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let model = Model {
            id: Uuid::new_v4(),
            user_ref,
            export_type: export_type.to_string(),
            config,
            status: STATUS_PENDING.to_string(),
            progress_pct: 0,
            file_url: None,
            file_size: None,
            error_message: None,
            retry_count: 0,
            max_retries,
            retry_history: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };

        let active: ActiveModel = model.clone().into();
        Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create export job: {}", e);
                ApiError::from(e)
            })?;

        tracing::info!(job_id = %model.id, export_type = %export_type, "Export job created");
        Ok(model)
    }

    /// Find an export job by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Entity::find_by_id(id).one(&self.db).await.map_err(|e| {
            tracing::error!("Failed to find export job: {}", e);
            ApiError::from(e)
        })
    }

    /// List jobs in `failed` status, oldest update first
    pub async fn list_failed(&self) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::Status.eq(STATUS_FAILED))
            .order_by_asc(Column::UpdatedAt)
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list failed export jobs: {}", e);
                ApiError::from(e)
            })
    }

    /// Record a failure: set status=failed, store the error, and append one
    /// {timestamp, error} entry to retry_history.
    pub async fn record_failure(&self, id: Uuid, error: &str) -> Result<Model, ApiError> {
        let job = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| crate::error::not_found("Export job not found"))?;

        let now = Utc::now().fixed_offset();
        let mut history = match job.retry_history.clone() {
            Some(JsonValue::Array(entries)) => entries,
            _ => Vec::new(),
        };
        history.push(json!({
            "timestamp": now.to_rfc3339(),
            "error": error,
        }));

        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_FAILED))
            .col_expr(Column::ErrorMessage, Expr::value(Some(error)))
            .col_expr(
                Column::RetryHistory,
                Expr::value(Some(JsonValue::Array(history))),
            )
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(job_id = %id, "Failed to record export failure: {}", e);
                ApiError::from(e)
            })?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| crate::error::not_found("Export job not found"))
    }

    /// Requeue a failed job for another attempt, consuming one retry
    pub async fn requeue(&self, id: Uuid) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PENDING))
            .col_expr(
                Column::RetryCount,
                Expr::col(Column::RetryCount).add(1),
            )
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(STATUS_FAILED))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(job_id = %id, "Failed to requeue export job: {}", e);
                ApiError::from(e)
            })?;

        Ok(())
    }

    /// Dead-letter a job whose retry budget is exhausted. retry_history and
    /// error_message are left intact for the operator.
    pub async fn mark_permanently_failed(&self, id: Uuid) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PERMANENTLY_FAILED))
            .col_expr(Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(STATUS_FAILED))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(job_id = %id, "Failed to dead-letter export job: {}", e);
                ApiError::from(e)
            })?;

        Ok(())
    }
}
