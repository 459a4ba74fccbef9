//! ParticipantSession entity model
//!
//! One join/leave interval for one attendee. A participant can contribute
//! many rows per webinar (rejoins), so uniqueness is the derived
//! (webinar_id, session_key) pair. The set for a webinar is replaced
//! wholesale on each resync.

use super::webinar::Entity as Webinar;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// ParticipantSession entity representing one attendance interval
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "participant_sessions")]
pub struct Model {
    /// Unique identifier for the session row (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Webinar this session belongs to
    pub webinar_id: Uuid,

    /// Derived composite session key, stable across re-derivation
    pub session_key: String,

    /// Provider participant id, if present
    pub participant_id: Option<String>,

    /// Display name, if present
    pub display_name: Option<String>,

    /// Email, if present
    pub email: Option<String>,

    /// Join timestamp
    pub join_time: Option<DateTimeWithTimeZone>,

    /// Leave timestamp
    pub leave_time: Option<DateTimeWithTimeZone>,

    /// Session duration in seconds
    pub duration_seconds: Option<i32>,

    /// Whether the attendee raised their hand during this session
    pub raised_hand: bool,

    /// Whether the attendee posted to chat during this session
    pub posted_chat: bool,

    /// Whether the attendee asked a question during this session
    pub asked_question: bool,

    /// Whether the attendee answered a poll during this session
    pub answered_polling: bool,

    /// Device metadata reported by the provider
    pub device: Option<String>,

    /// Location metadata reported by the provider
    pub location: Option<String>,

    /// Timestamp when the row was inserted
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Webinar",
        from = "Column::WebinarId",
        to = "super::webinar::Column::Id"
    )]
    Webinar,
}

impl Related<Webinar> for Entity {
    fn to() -> RelationDef {
        Relation::Webinar.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
