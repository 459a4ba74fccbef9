//! Remote worker RPC client.
//!
//! The orchestrator prefers delegating a sync to a dedicated worker service
//! and only runs the ingestion in-process when the worker is unreachable.
//! Every call here carries a hard timeout so a dead worker can never wedge
//! an attempt.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Which component executes a sync attempt. Chosen once at attempt start
/// and persisted on the attempt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Remote,
    Direct,
}

impl ExecutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPath::Remote => "remote",
            ExecutionPath::Direct => "direct",
        }
    }
}

impl std::str::FromStr for ExecutionPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(ExecutionPath::Remote),
            "direct" => Ok(ExecutionPath::Direct),
            other => Err(format!("unknown execution path: {}", other)),
        }
    }
}

/// Errors from remote worker RPC calls
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote worker not configured")]
    NotConfigured,
    #[error("remote worker request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("remote worker returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Result of a worker health probe
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub success: bool,
    pub latency_ms: u64,
}

/// Worker response to a start request
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteStartResponse {
    pub success: bool,
    #[serde(default)]
    pub attempt_id: Option<Uuid>,
}

/// Worker-reported progress for a running attempt
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProgress {
    pub status: String,
    #[serde(default)]
    pub progress: i32,
    #[serde(default)]
    pub current_stage: Option<String>,
}

/// Worker response to a cancel request
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCancelResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
struct StartSyncRequest<'a> {
    connection_id: Uuid,
    sync_type: &'a str,
}

/// HTTP client for the remote sync worker
#[derive(Clone)]
pub struct RemoteWorkerClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RemoteWorkerClient {
    /// Create a client for the worker at `base_url` with a per-call timeout
    pub fn new(base_url: &str, timeout_seconds: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    /// Probe the worker's health endpoint, measuring round-trip latency.
    /// Any error (timeout, connect, non-2xx) reports as unhealthy rather
    /// than surfacing.
    pub async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();
        let result = self
            .http
            .get(format!("{}/healthz", self.base_url))
            .timeout(self.timeout)
            .send()
            .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(response) => HealthStatus {
                success: response.status().is_success(),
                latency_ms,
            },
            Err(_) => HealthStatus {
                success: false,
                latency_ms,
            },
        }
    }

    /// Ask the worker to run a sync for the connection
    pub async fn start_sync(
        &self,
        connection_id: Uuid,
        sync_type: &str,
    ) -> Result<RemoteStartResponse, RemoteError> {
        let response = self
            .http
            .post(format!("{}/syncs", self.base_url))
            .timeout(self.timeout)
            .json(&StartSyncRequest {
                connection_id,
                sync_type,
            })
            .send()
            .await?;

        Self::parse(response).await
    }

    /// Read the worker's view of a running attempt
    pub async fn get_progress(&self, attempt_id: Uuid) -> Result<RemoteProgress, RemoteError> {
        let response = self
            .http
            .get(format!("{}/syncs/{}/progress", self.base_url, attempt_id))
            .timeout(self.timeout)
            .send()
            .await?;

        Self::parse(response).await
    }

    /// Ask the worker to cancel a running attempt
    pub async fn cancel(&self, attempt_id: Uuid) -> Result<RemoteCancelResponse, RemoteError> {
        let response = self
            .http
            .post(format!("{}/syncs/{}/cancel", self.base_url, attempt_id))
            .timeout(self.timeout)
            .send()
            .await?;

        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_path_round_trips_through_str() {
        for path in [ExecutionPath::Remote, ExecutionPath::Direct] {
            let parsed: ExecutionPath = path.as_str().parse().unwrap();
            assert_eq!(parsed, path);
        }
        assert!("hybrid".parse::<ExecutionPath>().is_err());
    }
}
