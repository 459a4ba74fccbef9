//! # ParticipantSession Repository
//!
//! Repository operations for the participant_sessions table. Sessions for a
//! webinar are replaced wholesale on each resync: delete-then-insert inside
//! one transaction, so readers never observe a mixed old/new set.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::participant_session::{ActiveModel, Column, Entity, Model};

/// One derived session row ready for storage
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_key: String,
    pub participant_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub join_time: Option<DateTime<FixedOffset>>,
    pub leave_time: Option<DateTime<FixedOffset>>,
    pub duration_seconds: Option<i32>,
    pub raised_hand: bool,
    pub posted_chat: bool,
    pub asked_question: bool,
    pub answered_polling: bool,
    pub device: Option<String>,
    pub location: Option<String>,
}

/// Repository for participant session database operations
pub struct ParticipantSessionRepository {
    db: DatabaseConnection,
}

impl ParticipantSessionRepository {
    /// Create a new ParticipantSessionRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Replace the full session set for a webinar.
    ///
    /// Runs delete + insert in a single transaction and returns the number of
    /// rows stored. Calling twice with the same input leaves the same set.
    pub async fn replace_for_webinar(
        &self,
        webinar_id: Uuid,
        sessions: Vec<NewSession>,
    ) -> Result<usize, ApiError> {
        let txn = self.db.begin().await.map_err(|e| {
            tracing::error!("Failed to open session replacement transaction: {}", e);
            ApiError::from(e)
        })?;

        Entity::delete_many()
            .filter(Column::WebinarId.eq(webinar_id))
            .exec(&txn)
            .await
            .map_err(|e| {
                tracing::error!(webinar_id = %webinar_id, "Failed to clear sessions: {}", e);
                ApiError::from(e)
            })?;

        let count = sessions.len();
        if count > 0 {
            let now = Utc::now().fixed_offset();
            let rows: Vec<ActiveModel> = sessions
                .into_iter()
                .map(|s| {
                    let model = Model {
                        id: Uuid::new_v4(),
                        webinar_id,
                        session_key: s.session_key,
                        participant_id: s.participant_id,
                        display_name: s.display_name,
                        email: s.email,
                        join_time: s.join_time,
                        leave_time: s.leave_time,
                        duration_seconds: s.duration_seconds,
                        raised_hand: s.raised_hand,
                        posted_chat: s.posted_chat,
                        asked_question: s.asked_question,
                        answered_polling: s.answered_polling,
                        device: s.device,
                        location: s.location,
                        created_at: now,
                    };
                    model.into()
                })
                .collect();

            Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await
                .map_err(|e| {
                    tracing::error!(webinar_id = %webinar_id, "Failed to insert sessions: {}", e);
                    ApiError::from(e)
                })?;
        }

        txn.commit().await.map_err(|e| {
            tracing::error!("Failed to commit session replacement: {}", e);
            ApiError::from(e)
        })?;

        Ok(count)
    }

    /// Count stored sessions for a webinar
    pub async fn count_for_webinar(&self, webinar_id: Uuid) -> Result<u64, ApiError> {
        Entity::find()
            .filter(Column::WebinarId.eq(webinar_id))
            .count(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to count sessions: {}", e);
                ApiError::from(e)
            })
    }

    /// List stored sessions for a webinar, ordered by session key
    pub async fn list_for_webinar(&self, webinar_id: Uuid) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::WebinarId.eq(webinar_id))
            .order_by_asc(Column::SessionKey)
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list sessions: {}", e);
                ApiError::from(e)
            })
    }
}
