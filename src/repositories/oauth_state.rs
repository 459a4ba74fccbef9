//! # OAuthState Repository
//!
//! Durable store for authorization-flow CSRF states. States are single-use
//! and time-boxed; expired rows are swept lazily whenever a state is taken.

use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::oauth_state::{ActiveModel, Column, Entity, Model};

/// Repository for OAuth state database operations
pub struct OAuthStateRepository {
    db: DatabaseConnection,
}

impl OAuthStateRepository {
    /// Create a new OAuthStateRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Issue a new state valid for `ttl_secs` seconds
    pub async fn issue(
        &self,
        state: &str,
        connection_hint: Option<Uuid>,
        ttl_secs: i64,
    ) -> Result<Model, ApiError> {
        let now = Utc::now();
        let model = Model {
            state: state.to_string(),
            connection_hint,
            expires_at: (now + Duration::seconds(ttl_secs)).fixed_offset(),
            created_at: now.fixed_offset(),
        };

        let active: ActiveModel = model.clone().into();
        Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to issue OAuth state: {}", e);
                ApiError::from(e)
            })?;

        Ok(model)
    }

    /// Consume a state: returns it if present and unexpired, deleting it
    /// either way. Expired rows across the table are swept on each call.
    pub async fn take(&self, state: &str) -> Result<Option<Model>, ApiError> {
        let now = Utc::now().fixed_offset();

        // Lazy TTL sweep.
        Entity::delete_many()
            .filter(Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to sweep expired OAuth states: {}", e);
                ApiError::from(e)
            })?;

        let found = Entity::find_by_id(state.to_string())
            .one(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to look up OAuth state: {}", e);
                ApiError::from(e)
            })?;

        if found.is_some() {
            Entity::delete_by_id(state.to_string())
                .exec(&self.db)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to delete consumed OAuth state: {}", e);
                    ApiError::from(e)
                })?;
        }

        Ok(found)
    }
}
