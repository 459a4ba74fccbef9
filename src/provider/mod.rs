//! # Provider integration
//!
//! HTTP access to the webinar provider: paginated listings with rate-limit
//! handling, multi-strategy attendance collection, and derivation of stable
//! session rows from raw attendance records.

pub mod attendance;
pub mod client;
pub mod session;
pub mod types;

pub use attendance::collect_attendance;
pub use client::ProviderClient;
pub use session::derive_sessions;
pub use types::{ProviderError, ProviderErrorKind, RawAttendance, RawWebinar};
