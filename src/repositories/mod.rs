//! # Repositories
//!
//! Typed database access wrappers around the SeaORM entities. Each
//! repository owns a pooled connection handle and keeps query shapes in one
//! place so callers never touch `Entity::find` directly.

pub mod connection;
pub mod export_job;
pub mod oauth_state;
pub mod participant_session;
pub mod sync_attempt;
pub mod webinar;

pub use connection::ConnectionRepository;
pub use export_job::ExportJobRepository;
pub use oauth_state::OAuthStateRepository;
pub use participant_session::{NewSession, ParticipantSessionRepository};
pub use sync_attempt::SyncAttemptRepository;
pub use webinar::{UpsertWebinar, WebinarRepository};
