//! Delivers one replication command to one follower over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{FollowerAddr, ReplicationCommand, ReplicationResponse};

/// Abstracted so tests can swap in an in-process double standing in for a
/// real network call.
#[async_trait]
pub trait ReplicationClient: Send + Sync {
    /// Delivers `command` to `follower`, honouring `min_delay_ms..=max_delay_ms`
    /// injected delay and `cancel`.
    async fn send(
        &self,
        follower: &FollowerAddr,
        command: ReplicationCommand,
        min_delay_ms: u64,
        max_delay_ms: u64,
        cancel: CancellationToken,
    ) -> ReplicationResponse;
}

/// The real implementation: one pooled [`reqwest::Client`] shared across
/// every follower and every write, posting the command JSON-encoded to
/// `{follower}/replicate`.
pub struct HttpReplicationClient {
    http: reqwest::Client,
}

impl HttpReplicationClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpReplicationClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples a uniform random delay in `[min, max]` milliseconds. `max` is
/// clamped up to `min` if the caller supplied `min > max`.
fn sample_delay(min_delay_ms: u64, max_delay_ms: u64) -> Option<Duration> {
    if max_delay_ms == 0 {
        return None;
    }
    let max_delay_ms = max_delay_ms.max(min_delay_ms);
    let millis = if min_delay_ms == max_delay_ms {
        min_delay_ms
    } else {
        rand::thread_rng().gen_range(min_delay_ms..=max_delay_ms)
    };
    Some(Duration::from_millis(millis))
}

#[async_trait]
impl ReplicationClient for HttpReplicationClient {
    async fn send(
        &self,
        follower: &FollowerAddr,
        command: ReplicationCommand,
        min_delay_ms: u64,
        max_delay_ms: u64,
        cancel: CancellationToken,
    ) -> ReplicationResponse {
        let key = command.key.clone();
        let version = command.version;

        if let Some(delay) = sample_delay(min_delay_ms, max_delay_ms) {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    warn!(follower = %follower.0, key = %key, version, "send cancelled during injected delay");
                    return ReplicationResponse::Timeout;
                }
            }
        }

        let url = format!("{}/replicate", follower.0);
        let request = self.http.post(&url).json(&command).send();

        let response = tokio::select! {
            result = request => match result {
                Ok(response) if response.status().is_success() => ReplicationResponse::Success,
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    ReplicationResponse::Failure(format!("{status}: {body}"))
                }
                Err(err) if err.is_timeout() => ReplicationResponse::Timeout,
                Err(err) => ReplicationResponse::Failure(err.to_string()),
            },
            _ = cancel.cancelled() => ReplicationResponse::Timeout,
        };

        match &response {
            ReplicationResponse::Success => {
                debug!(follower = %follower.0, key = %key, version, "follower send succeeded");
            }
            ReplicationResponse::Timeout => {
                warn!(follower = %follower.0, key = %key, version, "follower send timed out");
            }
            ReplicationResponse::Failure(reason) => {
                warn!(follower = %follower.0, key = %key, version, reason = %reason, "follower send failed");
            }
        }
        response
    }
}
