//! Webinar entity model
//!
//! Webinar rows are upserted keyed on (connection_id, provider_webinar_id).

use super::connection::Entity as Connection;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Webinar entity representing one provider webinar for a connection
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webinars")]
pub struct Model {
    /// Unique identifier for the webinar row (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Connection that owns this webinar
    pub connection_id: Uuid,

    /// Provider-side webinar identifier
    pub provider_webinar_id: String,

    /// Webinar topic/title
    pub topic: String,

    /// Scheduled start time, if the provider reported one
    pub start_time: Option<DateTimeWithTimeZone>,

    /// Scheduled duration in minutes
    pub duration_minutes: Option<i32>,

    /// Whether the webinar is a recurring series
    pub is_recurring: bool,

    /// Unique attendee count, derived from stored sessions after each resync
    pub total_attendees: i32,

    /// Raw provider payload kept for fields the typed columns do not cover
    #[sea_orm(column_type = "JsonBinary")]
    pub raw: Option<JsonValue>,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Connection",
        from = "Column::ConnectionId",
        to = "super::connection::Column::Id"
    )]
    Connection,
    #[sea_orm(has_many = "super::participant_session::Entity")]
    ParticipantSessions,
}

impl Related<Connection> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl Related<super::participant_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ParticipantSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
