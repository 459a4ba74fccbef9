//! Sync-run correlation scope and global subscriber setup.

use std::any::type_name_of_val;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};
use uuid::Uuid;

use crate::config::AppConfig;

/// Correlation scope for one sync run. Every error envelope produced while
/// the scope is active carries the attempt-derived trace id, so operators
/// can tie a problem response back to the attempt row that caused it.
#[derive(Debug, Clone)]
pub struct SyncScope {
    attempt_id: Uuid,
}

impl SyncScope {
    /// Scope a unit of work to the given sync attempt.
    pub fn for_attempt(attempt_id: Uuid) -> Self {
        Self { attempt_id }
    }

    /// The trace id recorded on logs and error envelopes for this run.
    pub fn trace_id(&self) -> String {
        format!("sync-{}", self.attempt_id)
    }
}

task_local! {
    static ACTIVE_SYNC_SCOPE: SyncScope;
}

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize global tracing/logging exactly once, wiring `log::` macros into the tracing pipeline.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    // Install log bridge first so legacy `log::` macros route through tracing.
    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        // A LogTracer may already be registered (tests, embedding harnesses).
        // That counts as success; anything else is worth a warning.
        let logger_type = type_name_of_val(log::logger());
        if !logger_type.contains("LogTracer") {
            eprintln!(
                "Warning: Failed to install log tracer bridge: {}. legacy `log::` macros will not emit structured tracing events.",
                err
            );
        }
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!(
            "Warning: Failed to set global tracing subscriber: {}. Default subscriber remains in effect.",
            err
        );
    }

    Ok(())
}

/// Execute `future` inside the given sync scope, keeping it available
/// through task-local storage for the whole run.
pub async fn with_sync_scope<Fut, R>(scope: SyncScope, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_SYNC_SCOPE.scope(scope, future).await
}

/// The trace id of the sync scope the running task belongs to, if any.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_SYNC_SCOPE.try_with(|scope| scope.trace_id()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_exposes_attempt_trace_id_inside_and_not_outside() {
        let attempt_id = Uuid::new_v4();

        assert!(current_trace_id().is_none());

        let seen = with_sync_scope(SyncScope::for_attempt(attempt_id), async {
            current_trace_id()
        })
        .await;
        assert_eq!(seen, Some(format!("sync-{}", attempt_id)));

        assert!(current_trace_id().is_none());
    }
}
