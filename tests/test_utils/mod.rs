//! Test utilities shared by the integration tests.
//!
//! Sets up in-memory SQLite databases with migrations applied and builds
//! application state pointed at mock provider/worker servers.

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;

use websync::config::AppConfig;
use websync::models::connection;
use websync::repositories::ConnectionRepository;

/// In-memory SQLite database with all migrations applied
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration for tests: keyless crypto, no inter-page delay, and a
/// small retry budget so failure paths resolve quickly.
#[allow(dead_code)]
pub fn test_config(provider_base: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.provider_api_base = provider_base.to_string();
    config.sync.page_delay_ms = 0;
    config.sync.page_retry_attempts = 2;
    config.sync.rate_limit_backoff_seconds = 1;
    config.sync.detail_batch_size = 4;
    config.sync.remote_timeout_seconds = 1;
    config.sync.remote_health_retries = 1;
    config
}

/// Create a connection whose access token is stored as plaintext, the way
/// keyless profiles store it.
pub async fn create_connection_with_token(
    db: &DatabaseConnection,
    token: &str,
) -> Result<connection::Model> {
    let repo = ConnectionRepository::new(db.clone());
    let created = repo
        .create("Acme Webinars", "test-salt", Some(json!({"plan": "pro"})))
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;
    repo.update_tokens(created.id, Some(token.as_bytes().to_vec()), None)
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;
    repo.find_by_id(created.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?
        .ok_or_else(|| anyhow::anyhow!("connection not found after create"))
}

/// A minimal non-recurring webinar payload (provider type 5)
#[allow(dead_code)]
pub fn webinar_json(id: &str, topic: &str) -> serde_json::Value {
    json!({
        "id": id,
        "topic": topic,
        "type": 5,
        "start_time": "2026-03-10T17:00:00Z",
        "duration": 60,
        "host_email": "host@example.com"
    })
}

/// An attendance record in the report endpoint shape
#[allow(dead_code)]
pub fn attendance_json(
    email: &str,
    name: &str,
    join_time: &str,
    leave_time: &str,
) -> serde_json::Value {
    json!({
        "user_email": email,
        "name": name,
        "join_time": join_time,
        "leave_time": leave_time,
        "duration": 1800,
        "raised_hand": false,
        "posted_chat": true,
        "asked_question": false,
        "answered_polling": false,
        "device": "desktop",
        "location": "Berlin"
    })
}
