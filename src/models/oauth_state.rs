//! OAuth state entity model
//!
//! Time-boxed CSRF-state entries stored durably instead of in an in-process
//! map. Expired rows are swept lazily on access.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// OAuthState entity representing one pending authorization flow
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Opaque CSRF state token (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub state: String,

    /// Connection the flow re-authorizes, when known
    pub connection_hint: Option<Uuid>,

    /// Expiry; rows past this instant are treated as absent
    pub expires_at: DateTimeWithTimeZone,

    /// Timestamp when the state was issued
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
