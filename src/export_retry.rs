//! # Export Retry Manager
//!
//! Periodic requeue of failed export jobs with exponential backoff and a
//! dead-letter terminal state. Each failed job waits `base * multiplier^n`
//! seconds (capped) after its last state change before being requeued; once
//! its retry budget is spent the next failure moves it to
//! `permanently_failed`, where it is never touched again.

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::ExportRetryConfig;
use crate::error::ApiError;
use crate::repositories::ExportJobRepository;

/// Outcome counts for one retry pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub scanned: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    pub waiting: usize,
}

/// Delay before the (retry_count+1)-th attempt of a job, in seconds.
///
/// Monotonically non-decreasing in `retry_count` and hard-capped at the
/// configured ceiling.
pub fn compute_backoff_seconds(config: &ExportRetryConfig, retry_count: i32) -> u64 {
    let exponent = retry_count.max(0);
    let delay =
        config.base_delay_seconds as f64 * config.backoff_multiplier.powi(exponent);
    (delay as u64).min(config.max_delay_seconds)
}

/// Background manager that requeues or dead-letters failed export jobs
pub struct ExportRetryManager {
    db: DatabaseConnection,
    config: ExportRetryConfig,
}

impl ExportRetryManager {
    /// Create a new export retry manager
    pub fn new(db: DatabaseConnection, config: ExportRetryConfig) -> Self {
        Self { db, config }
    }

    /// Process every failed job once: dead-letter exhausted jobs, requeue
    /// jobs whose backoff delay has elapsed, leave the rest waiting.
    #[instrument(skip(self))]
    pub async fn process_retries(&self) -> Result<RetryStats, ApiError> {
        let jobs = ExportJobRepository::new(self.db.clone());
        let failed = jobs.list_failed().await?;

        let now = Utc::now();
        let mut stats = RetryStats {
            scanned: failed.len(),
            ..Default::default()
        };

        for job in failed {
            if job.retry_count >= job.max_retries {
                jobs.mark_permanently_failed(job.id).await?;
                stats.dead_lettered += 1;
                counter!("websync_export_retries_total", "outcome" => "dead_letter").increment(1);
                info!(
                    job_id = %job.id,
                    retry_count = job.retry_count,
                    "Export job dead-lettered after exhausting retries"
                );
                continue;
            }

            let delay = compute_backoff_seconds(&self.config, job.retry_count) as i64;
            let idle = (now - job.updated_at.with_timezone(&Utc)).num_seconds();
            if idle < delay {
                stats.waiting += 1;
                debug!(
                    job_id = %job.id,
                    idle_seconds = idle,
                    delay_seconds = delay,
                    "Export job still inside its backoff window"
                );
                continue;
            }

            jobs.requeue(job.id).await?;
            stats.requeued += 1;
            counter!("websync_export_retries_total", "outcome" => "requeued").increment(1);
            info!(
                job_id = %job.id,
                retry = job.retry_count + 1,
                max_retries = job.max_retries,
                "Export job requeued"
            );
        }

        Ok(stats)
    }

    /// Run the periodic retry pass until the shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.config.tick_interval_seconds,
            "Starting export retry manager"
        );
        let tick_interval = TokioDuration::from_secs(self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Export retry manager shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    match self.process_retries().await {
                        Ok(stats) if stats.requeued > 0 || stats.dead_lettered > 0 => {
                            info!(?stats, "Export retry pass completed");
                        }
                        Ok(_) => debug!("Export retry pass found nothing actionable"),
                        Err(err) => error!(error = ?err, "Export retry pass failed"),
                    }
                    histogram!("websync_export_retry_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Export retry manager stopped");
    }
}
