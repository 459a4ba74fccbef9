//! # Sync Monitor
//!
//! Client-facing reconciliation of sync progress. A single `ProgressView`
//! decides what the caller sees: the remote worker's report when it owns
//! the attempt and answers, otherwise the durable attempt row. On top of
//! that, a stuck detector counts consecutive polls without progress
//! movement and escalates from a non-fatal warning to a one-shot
//! auto-cancel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::ApiError;
use crate::models::sync_attempt::{self, STAGE_FAILED, STATUS_CANCELLED};
use crate::remote::{ExecutionPath, RemoteWorkerClient};
use crate::repositories::SyncAttemptRepository;

/// What one progress poll reports to the caller
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ProgressSnapshot {
    pub attempt_id: Uuid,
    pub connection_id: Uuid,
    pub status: String,
    pub stage: String,
    pub progress_pct: i32,
    pub processed_items: i32,
    pub total_items: i32,
    pub execution_path: String,
    pub stuck: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Reconciles the remote worker's view with the attempt row.
pub struct ProgressView {
    db: DatabaseConnection,
    remote: Option<RemoteWorkerClient>,
}

impl ProgressView {
    pub fn new(db: DatabaseConnection, remote: Option<RemoteWorkerClient>) -> Self {
        Self { db, remote }
    }

    /// Fetch the current progress for an attempt.
    ///
    /// Remote-owned attempts prefer the worker's answer; any RPC failure
    /// falls back to the row. A failed row read gets one recovery retry
    /// before surfacing as an error.
    pub async fn fetch(&self, attempt_id: Uuid) -> Result<ProgressSnapshot, ApiError> {
        let attempts = SyncAttemptRepository::new(self.db.clone());

        let attempt = match attempts.find_by_id(attempt_id).await {
            Ok(found) => found,
            Err(first_err) => {
                warn!(attempt_id = %attempt_id, "Progress read failed, retrying once: {}", first_err.message);
                attempts.find_by_id(attempt_id).await.map_err(|_| first_err)?
            }
        }
        .ok_or_else(|| crate::error::not_found("Sync attempt not found"))?;

        let mut snapshot = ProgressSnapshot {
            attempt_id,
            connection_id: attempt.connection_id,
            status: attempt.status.clone(),
            stage: attempt.stage.clone(),
            progress_pct: attempt.stage_progress_pct,
            processed_items: attempt.processed_items,
            total_items: attempt.total_items,
            execution_path: attempt.execution_path.clone(),
            stuck: false,
            error_message: attempt.error_message.clone(),
        };

        if attempt.execution_path == ExecutionPath::Remote.as_str()
            && let Some(remote) = &self.remote
        {
            match remote.get_progress(attempt_id).await {
                Ok(progress) => {
                    snapshot.status = progress.status;
                    snapshot.progress_pct = progress.progress;
                    if let Some(stage) = progress.current_stage {
                        snapshot.stage = stage;
                    }
                }
                Err(err) => {
                    debug!(attempt_id = %attempt_id, error = %err, "Remote progress unavailable, using stored attempt");
                }
            }
        }

        Ok(snapshot)
    }
}

/// What the detector asks the monitor to do after one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckAction {
    None,
    /// Progress has not moved past the warn threshold; non-fatal
    Warn,
    /// Cancel threshold crossed; fires at most once per attempt
    Cancel,
}

/// Counts consecutive polls where progress sits unchanged strictly between
/// 0 and 100. Any movement (or leaving that band) resets the counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckDetector {
    warn_after_polls: u32,
    cancel_after_polls: u32,
    last_progress: Option<i32>,
    unchanged_polls: u32,
    cancel_fired: bool,
}

impl StuckDetector {
    pub fn new(config: &MonitorConfig) -> Self {
        let poll_ms = config.poll_interval_ms.max(1);
        Self {
            warn_after_polls: ((config.stuck_warn_seconds * 1000) / poll_ms).max(1) as u32,
            cancel_after_polls: ((config.stuck_cancel_seconds * 1000) / poll_ms).max(1) as u32,
            last_progress: None,
            unchanged_polls: 0,
            cancel_fired: false,
        }
    }

    /// Feed one poll's progress percentage
    pub fn observe(&mut self, progress_pct: i32) -> StuckAction {
        let in_band = progress_pct > 0 && progress_pct < 100;
        let unchanged = self.last_progress == Some(progress_pct);

        if in_band && unchanged {
            self.unchanged_polls = self.unchanged_polls.saturating_add(1);
        } else {
            self.unchanged_polls = 0;
        }
        self.last_progress = Some(progress_pct);

        if self.unchanged_polls >= self.cancel_after_polls {
            if self.cancel_fired {
                return StuckAction::Warn;
            }
            self.cancel_fired = true;
            return StuckAction::Cancel;
        }
        if self.unchanged_polls >= self.warn_after_polls {
            return StuckAction::Warn;
        }
        StuckAction::None
    }

    pub fn is_stuck(&self) -> bool {
        self.unchanged_polls >= self.warn_after_polls
    }
}

/// Durable monitor state for one connection, restored after a restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSession {
    pub connection_id: Uuid,
    pub attempt_id: Uuid,
    pub detector: StuckDetector,
    pub updated_at: DateTime<Utc>,
}

/// Storage seam for monitor sessions, keyed by connection id
pub trait MonitorStore: Send + Sync {
    fn load(&self, connection_id: Uuid) -> Option<MonitorSession>;
    fn save(&self, session: MonitorSession);
    fn clear(&self, connection_id: Uuid);
}

/// Process-local store; sufficient for a single service instance
#[derive(Default)]
pub struct InMemoryMonitorStore {
    sessions: Mutex<HashMap<Uuid, MonitorSession>>,
}

impl MonitorStore for InMemoryMonitorStore {
    fn load(&self, connection_id: Uuid) -> Option<MonitorSession> {
        self.sessions
            .lock()
            .ok()
            .and_then(|map| map.get(&connection_id).cloned())
    }

    fn save(&self, session: MonitorSession) {
        if let Ok(mut map) = self.sessions.lock() {
            map.insert(session.connection_id, session);
        }
    }

    fn clear(&self, connection_id: Uuid) {
        if let Ok(mut map) = self.sessions.lock() {
            map.remove(&connection_id);
        }
    }
}

/// Drives progress polls for the HTTP surface and applies stuck handling
pub struct SyncMonitor {
    db: DatabaseConnection,
    remote: Option<RemoteWorkerClient>,
    view: ProgressView,
    config: MonitorConfig,
    store: Arc<dyn MonitorStore>,
}

impl SyncMonitor {
    pub fn new(
        db: DatabaseConnection,
        remote: Option<RemoteWorkerClient>,
        config: MonitorConfig,
        store: Arc<dyn MonitorStore>,
    ) -> Self {
        Self {
            view: ProgressView::new(db.clone(), remote.clone()),
            db,
            remote,
            config,
            store,
        }
    }

    /// One monitor poll: reconcile progress, advance the stuck detector,
    /// and auto-cancel when the cancel threshold fires.
    pub async fn poll(&self, attempt_id: Uuid) -> Result<ProgressSnapshot, ApiError> {
        let mut snapshot = self.view.fetch(attempt_id).await?;
        let connection_id = snapshot.connection_id;

        if sync_attempt::is_terminal_status(&snapshot.status) {
            self.store.clear(connection_id);
            return Ok(snapshot);
        }

        let mut session = match self.store.load(connection_id) {
            Some(session) if session.attempt_id == attempt_id => session,
            _ => MonitorSession {
                connection_id,
                attempt_id,
                detector: StuckDetector::new(&self.config),
                updated_at: Utc::now(),
            },
        };

        match session.detector.observe(snapshot.progress_pct) {
            StuckAction::None => {}
            StuckAction::Warn => {
                snapshot.stuck = true;
            }
            StuckAction::Cancel => {
                snapshot.stuck = true;
                self.auto_cancel(attempt_id).await;
                snapshot.status = STATUS_CANCELLED.to_string();
            }
        }

        session.updated_at = Utc::now();
        self.store.save(session);
        Ok(snapshot)
    }

    /// Best-effort cancel: the remote RPC may fail, the local state is
    /// marked terminal regardless.
    async fn auto_cancel(&self, attempt_id: Uuid) {
        counter!("websync_monitor_auto_cancel_total").increment(1);
        warn!(attempt_id = %attempt_id, "Progress stalled past cancel threshold, auto-cancelling");

        if let Some(remote) = &self.remote
            && let Err(err) = remote.cancel(attempt_id).await
        {
            warn!(attempt_id = %attempt_id, error = %err, "Remote cancel failed during auto-cancel");
        }

        let attempts = SyncAttemptRepository::new(self.db.clone());
        match attempts
            .finalize(
                attempt_id,
                STATUS_CANCELLED,
                STAGE_FAILED,
                Some("Auto-cancelled: progress stalled past threshold"),
            )
            .await
        {
            Ok(true) => info!(attempt_id = %attempt_id, "Attempt auto-cancelled"),
            Ok(false) => debug!(attempt_id = %attempt_id, "Attempt already terminal during auto-cancel"),
            Err(err) => warn!(attempt_id = %attempt_id, "Failed to finalize auto-cancel: {}", err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 2_000,
            stuck_warn_seconds: 120,
            stuck_cancel_seconds: 360,
        }
    }

    #[test]
    fn thresholds_translate_to_poll_counts() {
        let detector = StuckDetector::new(&monitor_config());
        assert_eq!(detector.warn_after_polls, 60);
        assert_eq!(detector.cancel_after_polls, 180);
    }

    #[test]
    fn warn_then_cancel_and_cancel_fires_once() {
        let mut detector = StuckDetector::new(&monitor_config());

        // First observation records the baseline.
        assert_eq!(detector.observe(40), StuckAction::None);

        let mut actions = Vec::new();
        for _ in 0..200 {
            actions.push(detector.observe(40));
        }

        assert_eq!(actions[58], StuckAction::None);
        assert_eq!(actions[59], StuckAction::Warn);
        assert_eq!(actions[178], StuckAction::Warn);
        assert_eq!(actions[179], StuckAction::Cancel);
        assert_eq!(
            actions.iter().filter(|a| **a == StuckAction::Cancel).count(),
            1
        );
        // Post-cancel observations stay in the warn state.
        assert_eq!(actions[180], StuckAction::Warn);
    }

    #[test]
    fn progress_movement_resets_the_counter() {
        let mut detector = StuckDetector::new(&monitor_config());

        detector.observe(40);
        for _ in 0..60 {
            detector.observe(40);
        }
        assert!(detector.is_stuck());

        detector.observe(41);
        assert!(!detector.is_stuck());
    }

    #[test]
    fn zero_and_full_progress_never_count_as_stuck() {
        let mut detector = StuckDetector::new(&monitor_config());

        detector.observe(0);
        for _ in 0..300 {
            assert_eq!(detector.observe(0), StuckAction::None);
        }

        detector.observe(100);
        for _ in 0..300 {
            assert_eq!(detector.observe(100), StuckAction::None);
        }
    }

    #[test]
    fn in_memory_store_round_trips_sessions() {
        let store = InMemoryMonitorStore::default();
        let connection_id = Uuid::new_v4();
        let session = MonitorSession {
            connection_id,
            attempt_id: Uuid::new_v4(),
            detector: StuckDetector::new(&monitor_config()),
            updated_at: Utc::now(),
        };

        store.save(session.clone());
        let loaded = store.load(connection_id).expect("session stored");
        assert_eq!(loaded.attempt_id, session.attempt_id);

        store.clear(connection_id);
        assert!(store.load(connection_id).is_none());
    }
}
