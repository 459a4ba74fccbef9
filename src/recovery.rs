//! # Recovery Service
//!
//! Cancels sync attempts that stopped making progress. Staleness is judged
//! against two thresholds: attempts still at `initializing` are given less
//! slack than attempts that got further before going quiet. The sweep is
//! coarse and advisory, not a lease; an attempt it cancels may in rare
//! cases still be running, and the terminal-status guard on the attempt
//! row keeps that harmless.

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RecoveryConfig;
use crate::error::ApiError;
use crate::models::sync_attempt::{Model as SyncAttempt, STAGE_FAILED, STAGE_INITIALIZING, STATUS_CANCELLED};
use crate::repositories::SyncAttemptRepository;

/// Background recovery service for stuck sync attempts
pub struct RecoveryService {
    db: DatabaseConnection,
    config: RecoveryConfig,
}

impl RecoveryService {
    /// Create a new recovery service
    pub fn new(db: DatabaseConnection, config: RecoveryConfig) -> Self {
        Self { db, config }
    }

    /// Cancel stale active attempts for one connection. Returns how many
    /// attempts this call cancelled.
    #[instrument(skip(self), fields(connection_id = %connection_id))]
    pub async fn sweep(&self, connection_id: Uuid) -> Result<usize, ApiError> {
        let attempts = SyncAttemptRepository::new(self.db.clone());
        let active = attempts.find_active_for_connection(connection_id).await?;
        self.cancel_stale(&attempts, active).await
    }

    /// Cancel stale active attempts across all connections
    pub async fn sweep_all(&self) -> Result<usize, ApiError> {
        let attempts = SyncAttemptRepository::new(self.db.clone());
        let active = attempts.find_all_active().await?;
        self.cancel_stale(&attempts, active).await
    }

    /// Cancel ALL active attempts for a connection, stale or not. Used as
    /// pre-start cleanup and by the operator force-cleanup endpoint.
    #[instrument(skip(self), fields(connection_id = %connection_id))]
    pub async fn force_cleanup(&self, connection_id: Uuid) -> Result<usize, ApiError> {
        let attempts = SyncAttemptRepository::new(self.db.clone());
        let active = attempts.find_active_for_connection(connection_id).await?;

        let mut cancelled = 0usize;
        for attempt in active {
            let transitioned = attempts
                .finalize(
                    attempt.id,
                    STATUS_CANCELLED,
                    STAGE_FAILED,
                    Some("Cancelled by cleanup before new sync"),
                )
                .await?;
            if transitioned {
                cancelled += 1;
                counter!("websync_recovery_cancellations_total", "kind" => "forced").increment(1);
                info!(attempt_id = %attempt.id, "Force-cancelled active attempt");
            }
        }

        Ok(cancelled)
    }

    async fn cancel_stale(
        &self,
        attempts: &SyncAttemptRepository,
        active: Vec<SyncAttempt>,
    ) -> Result<usize, ApiError> {
        let now = Utc::now();
        let mut cancelled = 0usize;

        for attempt in active {
            let Some(stale_for) = self.staleness(&attempt, now) else {
                continue;
            };

            let message = format!(
                "Cancelled by recovery: no progress for {}s at stage {}",
                stale_for, attempt.stage
            );
            let transitioned = attempts
                .finalize(attempt.id, STATUS_CANCELLED, STAGE_FAILED, Some(&message))
                .await?;
            if transitioned {
                cancelled += 1;
                counter!("websync_recovery_cancellations_total", "kind" => "stale").increment(1);
                warn!(
                    attempt_id = %attempt.id,
                    connection_id = %attempt.connection_id,
                    stage = %attempt.stage,
                    stale_seconds = stale_for,
                    "Cancelled stale sync attempt"
                );
            }
        }

        Ok(cancelled)
    }

    /// Seconds of staleness if the attempt is past its threshold.
    ///
    /// Attempts that never left `initializing` are judged from their start
    /// time against the shorter threshold; anything further along is judged
    /// from its last progress write against the longer one.
    fn staleness(&self, attempt: &SyncAttempt, now: chrono::DateTime<Utc>) -> Option<i64> {
        let (reference, threshold) = if attempt.stage == STAGE_INITIALIZING {
            (
                attempt.started_at,
                self.config.initializing_threshold_seconds as i64,
            )
        } else {
            (
                attempt.updated_at,
                self.config.active_threshold_seconds as i64,
            )
        };

        let idle = (now - reference.with_timezone(&Utc)).num_seconds();
        (idle >= threshold).then_some(idle)
    }

    /// Run the periodic sweep until the shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.config.tick_interval_seconds,
            "Starting recovery service"
        );
        let tick_interval = TokioDuration::from_secs(self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Recovery service shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    match self.sweep_all().await {
                        Ok(cancelled) if cancelled > 0 => {
                            info!(cancelled, "Recovery sweep cancelled stale attempts");
                        }
                        Ok(_) => debug!("Recovery sweep found nothing stale"),
                        Err(err) => error!(error = ?err, "Recovery sweep failed"),
                    }
                    histogram!("websync_recovery_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Recovery service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, EntityTrait, Set};

    use crate::models::sync_attempt::{
        ActiveModel as AttemptActiveModel, Entity as AttemptEntity, STAGE_PARTICIPANTS,
        STATUS_IN_PROGRESS, STATUS_PENDING,
    };
    use crate::repositories::ConnectionRepository;

    fn recovery_config() -> RecoveryConfig {
        RecoveryConfig {
            initializing_threshold_seconds: 300,
            active_threshold_seconds: 600,
            tick_interval_seconds: 60,
        }
    }

    async fn test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("create in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        db
    }

    async fn insert_attempt(
        db: &DatabaseConnection,
        connection_id: Uuid,
        status: &str,
        stage: &str,
        age_seconds: i64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let then = (Utc::now() - Duration::seconds(age_seconds)).fixed_offset();
        let attempt = AttemptActiveModel {
            id: Set(id),
            connection_id: Set(connection_id),
            sync_type: Set("manual".to_string()),
            status: Set(status.to_string()),
            stage: Set(stage.to_string()),
            execution_path: Set("direct".to_string()),
            processed_items: Set(0),
            total_items: Set(0),
            stage_progress_pct: Set(0),
            error_message: Set(None),
            started_at: Set(then),
            completed_at: Set(None),
            updated_at: Set(then),
        };
        AttemptEntity::insert(attempt)
            .exec_without_returning(db)
            .await
            .expect("insert attempt");
        id
    }

    #[tokio::test]
    async fn sweep_cancels_only_past_threshold() {
        let db = test_db().await;
        let connection = ConnectionRepository::new(db.clone())
            .create("Acme", "salt", None)
            .await
            .expect("create connection");

        let fresh_init =
            insert_attempt(&db, connection.id, STATUS_PENDING, STAGE_INITIALIZING, 60).await;
        let stale_init =
            insert_attempt(&db, connection.id, STATUS_PENDING, STAGE_INITIALIZING, 400).await;
        let fresh_active =
            insert_attempt(&db, connection.id, STATUS_IN_PROGRESS, STAGE_PARTICIPANTS, 400).await;
        let stale_active =
            insert_attempt(&db, connection.id, STATUS_IN_PROGRESS, STAGE_PARTICIPANTS, 700).await;

        let recovery = RecoveryService::new(db.clone(), recovery_config());
        let cancelled = recovery.sweep(connection.id).await.expect("sweep");
        assert_eq!(cancelled, 2);

        let attempts = SyncAttemptRepository::new(db.clone());
        for (id, expected) in [
            (fresh_init, STATUS_PENDING),
            (stale_init, STATUS_CANCELLED),
            (fresh_active, STATUS_IN_PROGRESS),
            (stale_active, STATUS_CANCELLED),
        ] {
            let attempt = attempts
                .find_by_id(id)
                .await
                .expect("find attempt")
                .expect("attempt exists");
            assert_eq!(attempt.status, expected);
        }

        let stale = attempts
            .find_by_id(stale_active)
            .await
            .expect("find attempt")
            .expect("attempt exists");
        assert!(stale.error_message.unwrap().contains("no progress"));
        assert!(stale.completed_at.is_some());
    }

    #[tokio::test]
    async fn force_cleanup_cancels_everything_active() {
        let db = test_db().await;
        let connection = ConnectionRepository::new(db.clone())
            .create("Acme", "salt", None)
            .await
            .expect("create connection");

        insert_attempt(&db, connection.id, STATUS_PENDING, STAGE_INITIALIZING, 1).await;
        insert_attempt(&db, connection.id, STATUS_IN_PROGRESS, STAGE_PARTICIPANTS, 1).await;

        let recovery = RecoveryService::new(db.clone(), recovery_config());
        let cancelled = recovery
            .force_cleanup(connection.id)
            .await
            .expect("force cleanup");
        assert_eq!(cancelled, 2);

        let remaining = SyncAttemptRepository::new(db.clone())
            .find_active_for_connection(connection.id)
            .await
            .expect("list active");
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn sweep_never_touches_terminal_attempts() {
        let db = test_db().await;
        let connection = ConnectionRepository::new(db.clone())
            .create("Acme", "salt", None)
            .await
            .expect("create connection");

        let done = insert_attempt(&db, connection.id, "completed", "completed", 10_000).await;

        let recovery = RecoveryService::new(db.clone(), recovery_config());
        let cancelled = recovery.sweep(connection.id).await.expect("sweep");
        assert_eq!(cancelled, 0);

        let attempt = SyncAttemptRepository::new(db.clone())
            .find_by_id(done)
            .await
            .expect("find attempt")
            .expect("attempt exists");
        assert_eq!(attempt.status, "completed");
    }
}
