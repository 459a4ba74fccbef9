//! SyncAttempt entity model
//!
//! One row per run of the synchronization process for a connection. The row
//! is the only progress channel other components observe, so the orchestrator
//! keeps it current on every batch.

use super::connection::Entity as Connection;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Status values an attempt may hold. `pending` and `in_progress` are the
/// active states; the rest are terminal and absorbing.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_CANCELLED: &str = "cancelled";

/// Stage labels written as the orchestrator advances through the sync.
pub const STAGE_INITIALIZING: &str = "initializing";
pub const STAGE_FETCHING_WEBINAR_LIST: &str = "fetching_webinar_list";
pub const STAGE_WEBINAR_DETAILS: &str = "webinar_details";
pub const STAGE_PARTICIPANTS: &str = "participants";
pub const STAGE_COMPLETED: &str = "completed";
pub const STAGE_FAILED: &str = "failed";

/// Returns true if the given status is terminal (no further transitions).
pub fn is_terminal_status(status: &str) -> bool {
    matches!(status, STATUS_COMPLETED | STATUS_FAILED | STATUS_CANCELLED)
}

/// Returns true if the given status counts as active for the
/// at-most-one-active-attempt invariant.
pub fn is_active_status(status: &str) -> bool {
    matches!(status, STATUS_PENDING | STATUS_IN_PROGRESS)
}

/// SyncAttempt entity representing one sync run with durable progress
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_attempts")]
pub struct Model {
    /// Unique identifier for the attempt (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Connection this attempt synchronizes
    pub connection_id: Uuid,

    /// Kind of sync (manual|incremental|initial)
    pub sync_type: String,

    /// Current status (pending|in_progress|completed|failed|cancelled)
    pub status: String,

    /// Free-form stage label (initializing, fetching_webinar_list, ...)
    pub stage: String,

    /// Execution path chosen at attempt start (remote|direct)
    pub execution_path: String,

    /// Number of items processed so far
    pub processed_items: i32,

    /// Total items once known, 0 until then
    pub total_items: i32,

    /// processed/total * 100, 0 while total is unknown
    pub stage_progress_pct: i32,

    /// Human-readable error message when the attempt failed or was cancelled
    pub error_message: Option<String>,

    /// Timestamp when the attempt started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the attempt reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last progress write
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
}

impl Related<Connection> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_not_active() {
        for status in [STATUS_COMPLETED, STATUS_FAILED, STATUS_CANCELLED] {
            assert!(is_terminal_status(status));
            assert!(!is_active_status(status));
        }
    }

    #[test]
    fn active_statuses_are_not_terminal() {
        for status in [STATUS_PENDING, STATUS_IN_PROGRESS] {
            assert!(is_active_status(status));
            assert!(!is_terminal_status(status));
        }
    }
}
