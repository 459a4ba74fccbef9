//! Sync Orchestrator
//!
//! Owns the life of a sync attempt: pre-start cleanup, remote-worker warmup
//! with direct in-process fallback, batched ingestion of webinar details and
//! attendance, and durable progress reporting through the attempt row.

use std::sync::Arc;

use metrics::counter;
use sea_orm::DatabaseConnection;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::crypto::{self, CryptoKey};
use crate::error::ApiError;
use crate::models::connection::Model as Connection;
use crate::models::sync_attempt::{
    STAGE_COMPLETED, STAGE_FAILED, STAGE_FETCHING_WEBINAR_LIST, STAGE_PARTICIPANTS,
    STATUS_CANCELLED, STATUS_COMPLETED, STATUS_FAILED,
};
use crate::provider::types::ProviderErrorKind;
use crate::provider::{ProviderClient, ProviderError, RawWebinar, collect_attendance, derive_sessions};
use crate::recovery::RecoveryService;
use crate::remote::{ExecutionPath, RemoteWorkerClient};
use crate::repositories::{
    ConnectionRepository, ParticipantSessionRepository, SyncAttemptRepository, UpsertWebinar,
    WebinarRepository,
};
use crate::telemetry::{self, SyncScope};

/// Orchestrates sync attempts for provider connections
pub struct SyncOrchestrator {
    db: DatabaseConnection,
    provider: ProviderClient,
    remote: Option<RemoteWorkerClient>,
    crypto_key: Option<CryptoKey>,
    detail_batch_size: usize,
    remote_health_retries: u32,
    recovery: RecoveryService,
}

impl SyncOrchestrator {
    /// Build an orchestrator from the application configuration
    pub fn new(db: DatabaseConnection, config: &AppConfig) -> Result<Self, ApiError> {
        let crypto_key = match &config.crypto_key {
            Some(bytes) => Some(CryptoKey::new(bytes.clone()).map_err(|e| {
                error!("Invalid crypto key: {}", e);
                ApiError::from(crate::error::ErrorType::InternalServerError)
            })?),
            None => None,
        };

        Ok(Self {
            provider: ProviderClient::new(&config.provider_api_base, &config.sync),
            remote: config
                .remote_worker_base
                .as_deref()
                .map(|base| RemoteWorkerClient::new(base, config.sync.remote_timeout_seconds)),
            crypto_key,
            detail_batch_size: config.sync.detail_batch_size.max(1),
            remote_health_retries: config.sync.remote_health_retries.max(1),
            recovery: RecoveryService::new(db.clone(), config.recovery.clone()),
            db,
        })
    }

    /// Start a sync for a connection and return the attempt id.
    ///
    /// Exactly one attempt row exists per logical sync: the remote worker
    /// creates it when delegation succeeds, otherwise this service creates
    /// one `direct` row and runs the ingestion in a background task. The
    /// fallback never produces a second row.
    #[instrument(skip(self), fields(connection_id = %connection_id, sync_type = %sync_type))]
    pub async fn start_sync(
        self: &Arc<Self>,
        connection_id: Uuid,
        sync_type: &str,
    ) -> Result<Uuid, ApiError> {
        let connection = ConnectionRepository::new(self.db.clone())
            .find_by_id(connection_id)
            .await?
            .ok_or_else(|| crate::error::not_found("Connection not found"))?;

        // Pre-start cleanup enforces at-most-one active attempt.
        let cancelled = self.recovery.force_cleanup(connection_id).await?;
        if cancelled > 0 {
            info!(cancelled, "Cancelled lingering attempts before starting sync");
        }

        if let Some(attempt_id) = self.try_remote(connection_id, sync_type).await {
            counter!("websync_sync_started_total", "path" => "remote").increment(1);
            return Ok(attempt_id);
        }

        let attempts = SyncAttemptRepository::new(self.db.clone());
        let attempt = attempts
            .create(connection_id, sync_type, ExecutionPath::Direct.as_str())
            .await?;
        counter!("websync_sync_started_total", "path" => "direct").increment(1);

        let orchestrator = Arc::clone(self);
        let attempt_id = attempt.id;
        let scope = SyncScope::for_attempt(attempt_id);
        tokio::spawn(telemetry::with_sync_scope(scope, async move {
            orchestrator.run_direct(attempt_id, connection).await;
        }));

        Ok(attempt_id)
    }

    /// Remote warmup: bounded health probes, then delegation. Returns the
    /// worker-owned attempt id, or None to signal direct fallback.
    async fn try_remote(&self, connection_id: Uuid, sync_type: &str) -> Option<Uuid> {
        let remote = self.remote.as_ref()?;

        let mut healthy = false;
        for attempt in 1..=self.remote_health_retries {
            let status = remote.health_check().await;
            if status.success {
                debug!(latency_ms = status.latency_ms, "Remote worker healthy");
                healthy = true;
                break;
            }
            debug!(
                attempt,
                latency_ms = status.latency_ms,
                "Remote worker health check failed"
            );
        }
        if !healthy {
            info!("Remote worker unavailable, falling back to direct execution");
            return None;
        }

        match remote.start_sync(connection_id, sync_type).await {
            Ok(response) if response.success => {
                if let Some(attempt_id) = response.attempt_id {
                    info!(attempt_id = %attempt_id, "Sync delegated to remote worker");
                    return Some(attempt_id);
                }
                warn!("Remote worker accepted sync without an attempt id, falling back");
                None
            }
            Ok(_) => {
                info!("Remote worker declined sync, falling back to direct execution");
                None
            }
            Err(err) => {
                warn!(error = %err, "Remote start failed, falling back to direct execution");
                None
            }
        }
    }

    /// Cancel an attempt: best-effort remote cancel when the worker owns it,
    /// then local finalization regardless of RPC outcome. Returns whether
    /// this call performed the transition.
    pub async fn cancel_attempt(&self, attempt_id: Uuid, reason: &str) -> Result<bool, ApiError> {
        let attempts = SyncAttemptRepository::new(self.db.clone());
        let attempt = attempts
            .find_by_id(attempt_id)
            .await?
            .ok_or_else(|| crate::error::not_found("Sync attempt not found"))?;

        if attempt.execution_path == ExecutionPath::Remote.as_str()
            && let Some(remote) = &self.remote
            && let Err(err) = remote.cancel(attempt_id).await
        {
            warn!(attempt_id = %attempt_id, error = %err, "Remote cancel failed, finalizing locally anyway");
        }

        let transitioned = attempts
            .finalize(attempt_id, STATUS_CANCELLED, STAGE_FAILED, Some(reason))
            .await?;
        if transitioned {
            counter!("websync_sync_attempts_total", "status" => "cancelled").increment(1);
        }
        Ok(transitioned)
    }

    /// Direct execution path: fetch, derive, and store in bounded batches,
    /// with the attempt row as the single progress channel.
    async fn run_direct(self: &Arc<Self>, attempt_id: Uuid, connection: Connection) {
        let attempts = SyncAttemptRepository::new(self.db.clone());

        if let Err(err) = attempts.mark_in_progress(attempt_id).await {
            error!(attempt_id = %attempt_id, error = %err.message, "Failed to start attempt");
            return;
        }

        match self.ingest(attempt_id, &connection, &attempts).await {
            Ok(processed) => {
                match attempts
                    .finalize(attempt_id, STATUS_COMPLETED, STAGE_COMPLETED, None)
                    .await
                {
                    Ok(true) => {
                        counter!("websync_sync_attempts_total", "status" => "completed")
                            .increment(1);
                        info!(attempt_id = %attempt_id, processed, "Sync attempt completed");
                    }
                    Ok(false) => {
                        // Cancelled underneath us; partial progress stays.
                        info!(attempt_id = %attempt_id, "Attempt finalized elsewhere before completion");
                    }
                    Err(err) => {
                        error!(attempt_id = %attempt_id, error = %err.message, "Failed to finalize attempt");
                    }
                }
            }
            Err(err) => {
                let message = user_facing_error(&err);
                match attempts
                    .finalize(attempt_id, STATUS_FAILED, STAGE_FAILED, Some(&message))
                    .await
                {
                    Ok(true) => {
                        counter!("websync_sync_attempts_total", "status" => "failed").increment(1);
                        warn!(attempt_id = %attempt_id, error = %err, "Sync attempt failed");
                    }
                    Ok(false) => {
                        info!(attempt_id = %attempt_id, "Attempt already terminal, failure not recorded");
                    }
                    Err(finalize_err) => {
                        error!(
                            attempt_id = %attempt_id,
                            error = %finalize_err.message,
                            "Failed to record attempt failure"
                        );
                    }
                }
            }
        }
    }

    async fn ingest(
        self: &Arc<Self>,
        attempt_id: Uuid,
        connection: &Connection,
        attempts: &SyncAttemptRepository,
    ) -> Result<usize, ProviderError> {
        let token = self.access_token(connection)?;

        attempts
            .update_progress(attempt_id, STAGE_FETCHING_WEBINAR_LIST, 0, 0)
            .await
            .map_err(db_to_provider)?;

        let webinars = self.provider.list_webinars(&token).await?;
        let total = webinars.len();
        info!(attempt_id = %attempt_id, total, "Webinar list fetched");

        attempts
            .update_progress(attempt_id, STAGE_PARTICIPANTS, 0, total as i32)
            .await
            .map_err(db_to_provider)?;

        let webinar_repo = WebinarRepository::new(self.db.clone());
        let session_repo = ParticipantSessionRepository::new(self.db.clone());
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.detail_batch_size));

        let mut processed = 0usize;
        for batch in webinars.chunks(self.detail_batch_size) {
            // Stop promptly if recovery or a cancel finalized the attempt.
            let still_active = attempts
                .find_by_id(attempt_id)
                .await
                .map_err(db_to_provider)?
                .map(|a| crate::models::sync_attempt::is_active_status(&a.status))
                .unwrap_or(false);
            if !still_active {
                info!(attempt_id = %attempt_id, "Attempt no longer active, stopping ingestion");
                return Ok(processed);
            }

            let mut handles = Vec::with_capacity(batch.len());
            for webinar in batch {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| ProviderError::permanent("Fetch semaphore closed"))?;
                let orchestrator = Arc::clone(self);
                let token = token.clone();
                let webinar = webinar.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    orchestrator.fetch_one(&token, &webinar).await
                }));
            }

            for handle in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join_err) => {
                        warn!(error = %join_err, "Webinar fetch task panicked, skipping");
                        processed += 1;
                        continue;
                    }
                };

                match result {
                    Ok(Some((upsert, sessions))) => {
                        let stored = webinar_repo
                            .upsert(connection.id, upsert)
                            .await
                            .map_err(db_to_provider)?;
                        let count = session_repo
                            .replace_for_webinar(stored.id, sessions)
                            .await
                            .map_err(db_to_provider)?;
                        webinar_repo
                            .set_total_attendees(stored.id, count as i32)
                            .await
                            .map_err(db_to_provider)?;
                    }
                    Ok(None) => {
                        // Detail or attendance fetch failed; already logged.
                    }
                    Err(err) => return Err(err),
                }
                processed += 1;
            }

            attempts
                .update_progress(
                    attempt_id,
                    STAGE_PARTICIPANTS,
                    processed as i32,
                    total as i32,
                )
                .await
                .map_err(db_to_provider)?;
        }

        Ok(processed)
    }

    /// Fetch detail and attendance for one webinar.
    ///
    /// Returns Ok(None) for per-webinar failures that should be skipped;
    /// unauthorized errors propagate and abort the attempt.
    async fn fetch_one(
        &self,
        token: &str,
        listed: &RawWebinar,
    ) -> Result<Option<(UpsertWebinar, Vec<crate::repositories::NewSession>)>, ProviderError> {
        let detail = match self.provider.get_webinar_detail(token, &listed.id).await {
            Ok(detail) => detail,
            Err(err) if matches!(err.kind, ProviderErrorKind::Unauthorized) => return Err(err),
            Err(err) => {
                warn!(webinar_id = %listed.id, error = %err, "Detail fetch failed, using list payload");
                listed.clone()
            }
        };

        let records = match collect_attendance(&self.provider, token, &detail).await {
            Ok(records) => records,
            Err(err) if matches!(err.kind, ProviderErrorKind::Unauthorized) => return Err(err),
            Err(err) => {
                warn!(webinar_id = %detail.id, error = %err, "Skipping webinar, attendance unavailable");
                return Ok(None);
            }
        };

        let sessions = derive_sessions(&detail.id, &records);
        let upsert = UpsertWebinar {
            provider_webinar_id: detail.id.clone(),
            topic: detail.topic.clone().unwrap_or_default(),
            start_time: detail.start_time.map(|t| t.fixed_offset()),
            duration_minutes: detail.duration,
            is_recurring: detail.is_recurring(),
            raw: serde_json::to_value(&detail.extra).ok(),
        };

        Ok(Some((upsert, sessions)))
    }

    fn access_token(&self, connection: &Connection) -> Result<String, ProviderError> {
        let stored = connection
            .access_token_ciphertext
            .as_ref()
            .ok_or_else(|| ProviderError::unauthorized("Connection has no access token"))?;

        match &self.crypto_key {
            Some(key) => {
                let aad = format!("{}|{}", connection.id, connection.token_salt);
                crypto::decrypt_stored_token(key, aad.as_bytes(), stored)
                    .map(|(token, _)| token)
                    .map_err(|e| {
                        ProviderError::unauthorized(format!("Token decryption failed: {}", e))
                    })
            }
            // Keyless profiles (local/test) store tokens unencrypted.
            None => String::from_utf8(stored.clone())
                .map_err(|_| ProviderError::unauthorized("Stored token is not valid UTF-8")),
        }
    }
}

fn db_to_provider(err: ApiError) -> ProviderError {
    ProviderError::permanent(format!("Storage error: {}", err.message))
}

/// Keep operator-facing messages free of stack traces and internals.
fn user_facing_error(err: &ProviderError) -> String {
    match err.kind {
        ProviderErrorKind::Unauthorized => {
            "Provider authentication failed; reconnect the account".to_string()
        }
        ProviderErrorKind::RateLimited { .. } => {
            "Provider rate limit persisted beyond the retry budget".to_string()
        }
        _ => err.to_string(),
    }
}
