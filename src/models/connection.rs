//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which stores authorized links to the webinar provider together with the
//! encrypted credential material the sync core uses.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Connection entity representing one authorized provider account
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Human-readable label for the provider account
    pub account_label: String,

    /// Status of the connection (active|revoked|error)
    pub status: String,

    /// Encrypted access token ciphertext
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token ciphertext
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Per-connection salt used as AAD when encrypting tokens
    pub token_salt: String,

    /// Provider-specific opaque metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    /// Timestamp when the connection was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sync_attempt::Entity")]
    SyncAttempts,
    #[sea_orm(has_many = "super::webinar::Entity")]
    Webinars,
}

impl Related<super::sync_attempt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncAttempts.def()
    }
}

impl Related<super::webinar::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Webinars.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
