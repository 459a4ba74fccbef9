//! Database migrations for the webinar sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_10_000100_create_connections;
mod m2025_11_10_000200_create_sync_attempts;
mod m2025_11_10_000300_create_webinars;
mod m2025_11_10_000400_create_participant_sessions;
mod m2025_11_10_000500_create_export_jobs;
mod m2025_11_10_000600_create_oauth_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_10_000100_create_connections::Migration),
            Box::new(m2025_11_10_000200_create_sync_attempts::Migration),
            Box::new(m2025_11_10_000300_create_webinars::Migration),
            Box::new(m2025_11_10_000400_create_participant_sessions::Migration),
            Box::new(m2025_11_10_000500_create_export_jobs::Migration),
            Box::new(m2025_11_10_000600_create_oauth_states::Migration),
        ]
    }
}
