//! # Connection Repository
//!
//! Repository operations for the connections table: lookup, credential
//! updates after re-encryption, and status transitions.

use chrono::Utc;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::connection::{ActiveModel, Column, Entity, Model};

/// Repository for connection database operations
pub struct ConnectionRepository {
    db: DatabaseConnection,
}

impl ConnectionRepository {
    /// Create a new ConnectionRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new connection row
    pub async fn create(
        &self,
        account_label: &str,
        token_salt: &str,
        metadata: Option<JsonValue>,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let model = Model {
            id: Uuid::new_v4(),
            account_label: account_label.to_string(),
            status: "active".to_string(),
            access_token_ciphertext: None,
            refresh_token_ciphertext: None,
            token_salt: token_salt.to_string(),
            metadata,
            created_at: now,
            updated_at: now,
        };

        let active: ActiveModel = model.clone().into();
        Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create connection: {}", e);
                ApiError::from(e)
            })?;

        tracing::info!(connection_id = %model.id, "Connection created");
        Ok(model)
    }

    /// Find a connection by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Entity::find_by_id(id).one(&self.db).await.map_err(|e| {
            tracing::error!("Failed to find connection: {}", e);
            ApiError::from(e)
        })
    }

    /// List the IDs of all connections in `active` status
    pub async fn list_active_ids(&self) -> Result<Vec<Uuid>, ApiError> {
        let ids = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::Status.eq("active"))
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list active connections: {}", e);
                ApiError::from(e)
            })?;

        Ok(ids)
    }

    /// List all connections (used by the token re-encryption utility)
    pub async fn list_all(&self) -> Result<Vec<Model>, ApiError> {
        Entity::find().all(&self.db).await.map_err(|e| {
            tracing::error!("Failed to list connections: {}", e);
            ApiError::from(e)
        })
    }

    /// Replace the stored token ciphertexts for a connection
    pub async fn update_tokens(
        &self,
        id: Uuid,
        access_token_ciphertext: Option<Vec<u8>>,
        refresh_token_ciphertext: Option<Vec<u8>>,
    ) -> Result<(), ApiError> {
        let mut active = ActiveModel::new();
        active.id = Set(id);
        active.access_token_ciphertext = Set(access_token_ciphertext);
        active.refresh_token_ciphertext = Set(refresh_token_ciphertext);
        active.updated_at = Set(Utc::now().fixed_offset());

        active.update(&self.db).await.map_err(|e| {
            tracing::error!(connection_id = %id, "Failed to update connection tokens: {}", e);
            ApiError::from(e)
        })?;

        Ok(())
    }

    /// Update the status of a connection (e.g. `error` after repeated 401s)
    pub async fn update_status(&self, id: Uuid, status: &str) -> Result<(), ApiError> {
        let mut active = ActiveModel::new();
        active.id = Set(id);
        active.status = Set(status.to_string());
        active.updated_at = Set(Utc::now().fixed_offset());

        active.update(&self.db).await.map_err(|e| {
            tracing::error!(connection_id = %id, "Failed to update connection status: {}", e);
            ApiError::from(e)
        })?;

        Ok(())
    }
}
