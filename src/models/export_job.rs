//! ExportJob entity model
//!
//! Durable background export jobs with bounded-retry and dead-letter
//! semantics. retry_history keeps one entry per failure so an operator can
//! reconstruct what happened after a job is dead-lettered.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_CANCELLED: &str = "cancelled";
/// Dead-letter state: reachable only after the retry budget is exhausted.
pub const STATUS_PERMANENTLY_FAILED: &str = "permanently_failed";

/// ExportJob entity representing one background export request
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "export_jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// User that requested the export
    pub user_ref: Uuid,

    /// Kind of export (e.g. attendees_csv, engagement_report)
    pub export_type: String,

    /// Arbitrary structured parameters: format, filters, title, date range
    #[sea_orm(column_type = "JsonBinary")]
    pub config: Option<JsonValue>,

    /// Current status of the job
    pub status: String,

    /// Progress percentage reported by the worker
    pub progress_pct: i32,

    /// Pointer to the produced file on success
    pub file_url: Option<String>,

    /// Size of the produced file in bytes
    pub file_size: Option<i64>,

    /// Error message from the most recent failure
    pub error_message: Option<String>,

    /// Number of retries consumed so far
    pub retry_count: i32,

    /// Retry budget for this job
    pub max_retries: i32,

    /// JSON array of {timestamp, error} entries, one per failure
    #[sea_orm(column_type = "JsonBinary")]
    pub retry_history: Option<JsonValue>,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when a worker picked the job up
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last state change
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
