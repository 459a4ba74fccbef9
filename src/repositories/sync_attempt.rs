//! # SyncAttempt Repository
//!
//! Repository operations for the sync_attempts table. Terminal statuses are
//! absorbing: every transition out of an active state goes through
//! conditional updates filtered on the active statuses, so a finalized
//! attempt can never be resurrected or re-finalized.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::sync_attempt::{
    ActiveModel, Column, Entity, Model, STAGE_INITIALIZING, STATUS_IN_PROGRESS, STATUS_PENDING,
};

/// Repository for sync attempt database operations
pub struct SyncAttemptRepository {
    db: DatabaseConnection,
}

impl SyncAttemptRepository {
    /// Create a new SyncAttemptRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new pending attempt for a connection
    pub async fn create(
        &self,
        connection_id: Uuid,
        sync_type: &str,
        execution_path: &str,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let model = Model {
            id: Uuid::new_v4(),
            connection_id,
            sync_type: sync_type.to_string(),
            status: STATUS_PENDING.to_string(),
            stage: STAGE_INITIALIZING.to_string(),
            execution_path: execution_path.to_string(),
            processed_items: 0,
            total_items: 0,
            stage_progress_pct: 0,
            error_message: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };

        let active: ActiveModel = model.clone().into();
        Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create sync attempt: {}", e);
                ApiError::from(e)
            })?;

        tracing::info!(
            attempt_id = %model.id,
            connection_id = %connection_id,
            sync_type = %sync_type,
            execution_path = %execution_path,
            "Sync attempt created"
        );

        Ok(model)
    }

    /// Find an attempt by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Entity::find_by_id(id).one(&self.db).await.map_err(|e| {
            tracing::error!("Failed to find sync attempt: {}", e);
            ApiError::from(e)
        })
    }

    /// List the active (pending or in_progress) attempts for a connection,
    /// oldest first
    pub async fn find_active_for_connection(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::ConnectionId.eq(connection_id))
            .filter(Column::Status.is_in([STATUS_PENDING, STATUS_IN_PROGRESS]))
            .order_by_asc(Column::StartedAt)
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list active sync attempts: {}", e);
                ApiError::from(e)
            })
    }

    /// List active attempts across all connections (recovery loop)
    pub async fn find_all_active(&self) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::Status.is_in([STATUS_PENDING, STATUS_IN_PROGRESS]))
            .order_by_asc(Column::StartedAt)
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list active sync attempts: {}", e);
                ApiError::from(e)
            })
    }

    /// Move a pending attempt to in_progress. No-op if already terminal.
    pub async fn mark_in_progress(&self, id: Uuid) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_IN_PROGRESS))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(STATUS_PENDING))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(attempt_id = %id, "Failed to mark attempt in progress: {}", e);
                ApiError::from(e)
            })?;

        Ok(())
    }

    /// Write a progress snapshot for an active attempt.
    ///
    /// `stage_progress_pct` is derived here: processed/total*100 clamped to
    /// 0..=100, and 0 while the total is still unknown. The write is filtered
    /// on active statuses so a late progress report cannot touch a finalized
    /// row.
    pub async fn update_progress(
        &self,
        id: Uuid,
        stage: &str,
        processed_items: i32,
        total_items: i32,
    ) -> Result<(), ApiError> {
        let pct = if total_items > 0 {
            ((processed_items as i64 * 100) / total_items as i64).clamp(0, 100) as i32
        } else {
            0
        };
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(Column::Stage, Expr::value(stage))
            .col_expr(Column::ProcessedItems, Expr::value(processed_items))
            .col_expr(Column::TotalItems, Expr::value(total_items))
            .col_expr(Column::StageProgressPct, Expr::value(pct))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_in([STATUS_PENDING, STATUS_IN_PROGRESS]))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(attempt_id = %id, "Failed to update attempt progress: {}", e);
                ApiError::from(e)
            })?;

        Ok(())
    }

    /// Finalize an attempt into a terminal status.
    ///
    /// Returns `true` if this call performed the transition, `false` when the
    /// attempt was already terminal (or absent). Callers that must act
    /// exactly once (auto-cancel) key off the return value.
    pub async fn finalize(
        &self,
        id: Uuid,
        status: &str,
        stage: &str,
        error_message: Option<&str>,
    ) -> Result<bool, ApiError> {
        debug_assert!(crate::models::sync_attempt::is_terminal_status(status));

        let now = Utc::now().fixed_offset();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(Column::Stage, Expr::value(stage))
            .col_expr(Column::ErrorMessage, Expr::value(error_message))
            .col_expr(Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_in([STATUS_PENDING, STATUS_IN_PROGRESS]))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(attempt_id = %id, "Failed to finalize attempt: {}", e);
                ApiError::from(e)
            })?;

        Ok(result.rows_affected > 0)
    }
}
