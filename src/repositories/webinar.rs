//! # Webinar Repository
//!
//! Repository operations for the webinars table. Rows are upserted keyed on
//! (connection_id, provider_webinar_id) so a resync updates in place instead
//! of duplicating.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::webinar::{ActiveModel, Column, Entity, Model};

/// Fields written on each upsert of a webinar row
#[derive(Debug, Clone)]
pub struct UpsertWebinar {
    pub provider_webinar_id: String,
    pub topic: String,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub duration_minutes: Option<i32>,
    pub is_recurring: bool,
    pub raw: Option<JsonValue>,
}

/// Repository for webinar database operations
pub struct WebinarRepository {
    db: DatabaseConnection,
}

impl WebinarRepository {
    /// Create a new WebinarRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or update a webinar keyed on (connection_id, provider_webinar_id).
    ///
    /// Returns the stored row (existing id preserved on update).
    pub async fn upsert(
        &self,
        connection_id: Uuid,
        webinar: UpsertWebinar,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let model = Model {
            id: Uuid::new_v4(),
            connection_id,
            provider_webinar_id: webinar.provider_webinar_id.clone(),
            topic: webinar.topic,
            start_time: webinar.start_time,
            duration_minutes: webinar.duration_minutes,
            is_recurring: webinar.is_recurring,
            total_attendees: 0,
            raw: webinar.raw,
            created_at: now,
            updated_at: now,
        };

        let active: ActiveModel = model.into();
        Entity::insert(active)
            .on_conflict(
                OnConflict::columns([Column::ConnectionId, Column::ProviderWebinarId])
                    .update_columns([
                        Column::Topic,
                        Column::StartTime,
                        Column::DurationMinutes,
                        Column::IsRecurring,
                        Column::Raw,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to upsert webinar: {}", e);
                ApiError::from(e)
            })?;

        // Re-read so the caller sees the surviving row id after a conflict.
        self.find_by_provider_id(connection_id, &webinar.provider_webinar_id)
            .await?
            .ok_or_else(|| crate::error::not_found("Webinar not found after upsert"))
    }

    /// Find a webinar by its provider id within a connection
    pub async fn find_by_provider_id(
        &self,
        connection_id: Uuid,
        provider_webinar_id: &str,
    ) -> Result<Option<Model>, ApiError> {
        Entity::find()
            .filter(Column::ConnectionId.eq(connection_id))
            .filter(Column::ProviderWebinarId.eq(provider_webinar_id))
            .one(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find webinar: {}", e);
                ApiError::from(e)
            })
    }

    /// List all webinars stored for a connection
    pub async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::ConnectionId.eq(connection_id))
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list webinars: {}", e);
                ApiError::from(e)
            })
    }

    /// Set the derived attendee count after a session replacement
    pub async fn set_total_attendees(&self, webinar_id: Uuid, count: i32) -> Result<(), ApiError> {
        Entity::update_many()
            .col_expr(Column::TotalAttendees, Expr::value(count))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(webinar_id))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(webinar_id = %webinar_id, "Failed to set attendee count: {}", e);
                ApiError::from(e)
            })?;

        Ok(())
    }
}
