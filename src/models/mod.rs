//! # Data Models
//!
//! This module contains all the SeaORM entity models used by the webinar
//! sync service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod export_job;
pub mod oauth_state;
pub mod participant_session;
pub mod sync_attempt;
pub mod webinar;

pub use connection::Entity as Connection;
pub use export_job::Entity as ExportJob;
pub use oauth_state::Entity as OAuthState;
pub use participant_session::Entity as ParticipantSession;
pub use sync_attempt::Entity as SyncAttempt;
pub use webinar::Entity as Webinar;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "websync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
