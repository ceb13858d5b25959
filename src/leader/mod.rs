//! Orchestrates local apply + quorum-gated parallel fan-out to followers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use crate::config::RuntimeConfig;
use crate::core::{CoreError, FollowerAddr, Key, ReplicationCommand, ReplicationResponse, Result, Value};
use crate::replication::ReplicationClient;
use crate::store::Store;
use crate::version::VersionSource;

/// Result of one `LeaderWriter::write` call.
///
/// `responses` is a snapshot at the quorum point, not a full audit log: it
/// holds exactly the replication attempts that had completed by the time
/// this `WriteResult` was produced, in completion order. Slower followers
/// keep replicating in the background after this value is returned.
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub is_success: bool,
    pub required_quorum: usize,
    pub successful_followers: usize,
    pub responses: Vec<(FollowerAddr, ReplicationResponse)>,
    pub was_cancelled: bool,
}

pub struct LeaderWriter {
    store: Arc<Store>,
    version_source: Arc<dyn VersionSource>,
    replication_client: Arc<dyn ReplicationClient>,
    followers: Vec<FollowerAddr>,
    runtime_config: Arc<RuntimeConfig>,
    follower_timeout_ms: u64,
}

impl LeaderWriter {
    pub fn new(
        store: Arc<Store>,
        version_source: Arc<dyn VersionSource>,
        replication_client: Arc<dyn ReplicationClient>,
        followers: Vec<FollowerAddr>,
        runtime_config: Arc<RuntimeConfig>,
        follower_timeout_ms: u64,
    ) -> Self {
        Self {
            store,
            version_source,
            replication_client,
            followers,
            runtime_config,
            follower_timeout_ms,
        }
    }

    /// Rejects invalid input, issues a version, applies locally, fans out
    /// to every follower in parallel, and returns as soon as `WriteQuorum`
    /// acks arrive (or fewer, if cancelled or exhausted).
    pub async fn write(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        cancel: CancellationToken,
    ) -> Result<WriteResult> {
        let key = key.into();
        let value = value.into();
        let span = info_span!(
            "write",
            key = %key,
            version = tracing::field::Empty,
            quorum = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        );
        let started = Instant::now();
        let result = self
            .write_inner(key, value, cancel, &span)
            .instrument(span.clone())
            .await;
        if let Ok(result) = &result {
            span.record("elapsed_ms", started.elapsed().as_millis() as u64);
            info!(
                parent: &span,
                successful_followers = result.successful_followers,
                is_success = result.is_success,
                was_cancelled = result.was_cancelled,
                "write completed"
            );
        }
        result
    }

    async fn write_inner(
        &self,
        key: Key,
        value: Value,
        cancel: CancellationToken,
        span: &tracing::Span,
    ) -> Result<WriteResult> {
        if key.is_empty() {
            return Err(CoreError::InvalidInput("key must not be empty".to_string()));
        }
        if cancel.is_cancelled() {
            return Ok(WriteResult {
                is_success: false,
                required_quorum: self.runtime_config.write_quorum(),
                successful_followers: 0,
                responses: Vec::new(),
                was_cancelled: true,
            });
        }

        let version = self.version_source.next();
        span.record("version", version);
        self.store.set(key.clone(), value.clone(), version);

        let followers = self.followers.clone();
        let required_quorum = self.runtime_config.write_quorum();
        span.record("quorum", required_quorum);
        if required_quorum > followers.len() {
            return Err(CoreError::InvalidConfiguration(format!(
                "write quorum {required_quorum} exceeds follower count {}",
                followers.len()
            )));
        }
        if required_quorum == 0 || followers.is_empty() {
            return Ok(WriteResult {
                is_success: true,
                required_quorum,
                successful_followers: 0,
                responses: Vec::new(),
                was_cancelled: false,
            });
        }

        let min_delay_ms = self.runtime_config.min_delay_ms();
        let max_delay_ms = self.runtime_config.max_delay_ms();
        let command = ReplicationCommand::new(key, value, version);
        let follower_timeout_ms = self.follower_timeout_ms;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(FollowerAddr, ReplicationResponse)>();
        for follower in followers.iter().cloned() {
            let tx = tx.clone();
            let client = Arc::clone(&self.replication_client);
            let command = command.clone();
            // Deliberately independent of the caller's `cancel`: in-flight
            // sends must survive the Write call returning. Spawning detaches
            // this task from the request.
            tokio::spawn(async move {
                let send_cancel = CancellationToken::new();
                let response = if follower_timeout_ms > 0 {
                    let timeout_trigger = send_cancel.clone();
                    tokio::select! {
                        resp = client.send(&follower, command, min_delay_ms, max_delay_ms, send_cancel.clone()) => resp,
                        _ = tokio::time::sleep(Duration::from_millis(follower_timeout_ms)) => {
                            timeout_trigger.cancel();
                            ReplicationResponse::Timeout
                        }
                    }
                } else {
                    client.send(&follower, command, min_delay_ms, max_delay_ms, send_cancel).await
                };
                let _ = tx.send((follower, response));
            });
        }
        drop(tx);

        let mut responses = Vec::with_capacity(followers.len());
        let mut success_count = 0usize;
        let mut was_cancelled = false;
        let mut received = 0usize;

        while received < followers.len() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    was_cancelled = true;
                    break;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some((follower, response)) => {
                            received += 1;
                            if response.is_success() {
                                success_count += 1;
                            }
                            responses.push((follower, response));
                            if success_count >= required_quorum {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(WriteResult {
            is_success: success_count >= required_quorum,
            required_quorum,
            successful_followers: success_count,
            responses,
            was_cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeRole, StartupConfig};
    use crate::store::VersioningPolicy;
    use crate::version::CounterVersionSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scriptable fake that stands in for a real network call in tests.
    struct ScriptedClient {
        outcomes: Mutex<std::collections::HashMap<String, ReplicationResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(outcomes: Vec<(&str, ReplicationResponse)>) -> Self {
            Self {
                outcomes: Mutex::new(
                    outcomes
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReplicationClient for ScriptedClient {
        async fn send(
            &self,
            follower: &FollowerAddr,
            _command: ReplicationCommand,
            _min_delay_ms: u64,
            _max_delay_ms: u64,
            _cancel: CancellationToken,
        ) -> ReplicationResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .get(&follower.0)
                .cloned()
                .unwrap_or(ReplicationResponse::Failure("unscripted follower".to_string()))
        }
    }

    fn followers(n: usize) -> Vec<FollowerAddr> {
        (0..n)
            .map(|i| FollowerAddr::from(format!("http://127.0.0.1:900{i}")))
            .collect()
    }

    fn writer_with(
        client: ScriptedClient,
        write_quorum: usize,
        follower_count: usize,
    ) -> LeaderWriter {
        let startup = StartupConfig {
            role: NodeRole::Leader,
            bind_addr: "127.0.0.1:0".to_string(),
            followers: followers(follower_count),
            write_quorum,
            follower_timeout_ms: 2000,
            min_delay_ms: 0,
            max_delay_ms: 0,
            use_versioning: true,
        };
        LeaderWriter::new(
            Arc::new(Store::new(VersioningPolicy::Monotonic)),
            Arc::new(CounterVersionSource::new()),
            Arc::new(client),
            startup.followers.clone(),
            Arc::new(RuntimeConfig::new(&startup)),
            startup.follower_timeout_ms,
        )
    }

    #[tokio::test]
    async fn zero_quorum_succeeds_with_zero_acks() {
        let writer = writer_with(ScriptedClient::new(vec![]), 0, 2);
        let result = writer
            .write("k", "v", CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success);
        assert_eq!(result.successful_followers, 0);
        assert!(result.responses.is_empty());
    }

    #[tokio::test]
    async fn quorum_above_follower_count_is_rejected_before_fanout() {
        let writer = writer_with(ScriptedClient::new(vec![]), 5, 2);
        let err = writer.write("k", "v", CancellationToken::new()).await;
        assert!(matches!(err, Err(CoreError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn quorum_met_by_successful_followers() {
        let client = ScriptedClient::new(vec![
            ("http://127.0.0.1:9000", ReplicationResponse::Success),
            ("http://127.0.0.1:9001", ReplicationResponse::Success),
        ]);
        let writer = writer_with(client, 1, 2);
        let result = writer
            .write("k", "v", CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success);
        assert!(result.successful_followers >= 1);
    }

    #[tokio::test]
    async fn quorum_not_met_when_all_followers_fail() {
        let client = ScriptedClient::new(vec![
            ("http://127.0.0.1:9000", ReplicationResponse::Failure("down".to_string())),
            ("http://127.0.0.1:9001", ReplicationResponse::Failure("down".to_string())),
        ]);
        let writer = writer_with(client, 2, 2);
        let result = writer
            .write("k", "v", CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_success);
        assert_eq!(result.successful_followers, 0);
        assert_eq!(result.responses.len(), 2);
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let writer = writer_with(ScriptedClient::new(vec![]), 0, 0);
        let err = writer.write("", "v", CancellationToken::new()).await;
        assert!(matches!(err, Err(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let writer = writer_with(ScriptedClient::new(vec![]), 0, 2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = writer.write("k", "v", cancel).await.unwrap();
        assert!(result.was_cancelled);
        assert!(!result.is_success);
    }

    #[tokio::test]
    async fn local_apply_precedes_fanout_leader_reads_its_own_write() {
        let client = ScriptedClient::new(vec![("http://127.0.0.1:9000", ReplicationResponse::Success)]);
        let writer = writer_with(client, 1, 1);
        writer.write("alpha", "one", CancellationToken::new()).await.unwrap();
        assert_eq!(writer.store.get("alpha").as_deref(), Some("one"));
    }
}
