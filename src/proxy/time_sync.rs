//! The begin / observe / end time synchronization handshake.
//!
//! ```text
//! Idle ──spawn begin──▶ Begin-Issued ─┐
//!   │                                 │ done signal
//!   └──────tick: observe──▶ Polling ◀─┘
//!                             │
//!                             ▼
//!                          Ending ──end body──▶ Done
//! ```
//!
//! The `begin` call runs on its own task while the caller's task keeps the
//! remote clock observed. When `begin` completes, successfully or not, it
//! fills a single-slot signal; the polling loop reads it at its next
//! iteration, stops, and the session issues exactly one `end`.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::channel::SignedChannel;
use super::config::ProxyConfig;
use super::envelope::Action;
use super::metrics::MetricEvent;
use super::random::RandomSource;
use super::signature::CredentialSigner;
use super::time_utils::non_zero_interval;
use super::transport::Transport;
use crate::ProxyError;

/// Client side of the time synchronization protocol.
///
/// A session object holds no per-sync state; every call to
/// [`handle_server_time`](Self::handle_server_time) runs one complete
/// handshake, and concurrent calls on clones are independent.
///
/// # Example
///
/// ```rust,no_run
/// use signed_proxy::{ConfigPreset, ProxyConfig, SignedChannel, TimeSyncSession};
///
/// # async fn example() -> Result<(), signed_proxy::ProxyError> {
/// let channel = SignedChannel::from_config(ProxyConfig::from(ConfigPreset::Production))?;
/// let session = TimeSyncSession::from_channel(channel);
///
/// let server_time = session.handle_server_time().await?;
/// println!("server time: {server_time}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TimeSyncSession {
    channel: SignedChannel,
}

impl TimeSyncSession {
    /// Creates a session from its three collaborators.
    pub fn new(
        random: Arc<dyn RandomSource>,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn CredentialSigner>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self::from_channel(SignedChannel::new(random, transport, signer, config))
    }

    /// Creates a session sharing an existing channel.
    pub fn from_channel(channel: SignedChannel) -> Self {
        Self { channel }
    }

    /// The channel requests go through.
    pub fn channel(&self) -> &SignedChannel {
        &self.channel
    }

    /// Opens the sync window. The response body carries nothing of interest.
    pub async fn begin(&self) -> Result<(), ProxyError> {
        let timeout = self.channel.config().access_timeout;
        self.channel.send(Action::Begin, timeout).await.map(|_| ())
    }

    /// One warm-up observation of the remote clock.
    pub async fn observe(&self) -> Result<(), ProxyError> {
        self.channel.send(Action::Observe, 0).await.map(|_| ())
    }

    /// Closes the sync window and returns the server time, with surrounding
    /// newlines removed.
    pub async fn end(&self) -> Result<String, ProxyError> {
        let timeout = self.channel.config().access_timeout;
        let body = self.channel.send(Action::End, timeout).await?;
        Ok(body.trim_matches('\n').to_string())
    }

    /// Runs one full handshake and returns the server time.
    ///
    /// Failures of `begin` and of individual observations are logged and
    /// swallowed; only the error of the final `end` call is returned.
    pub async fn handle_server_time(&self) -> Result<String, ProxyError> {
        let (done_tx, mut done_rx) = oneshot::channel::<()>();

        let session = self.clone();
        tokio::spawn(async move {
            if let Err(err) = session.begin().await {
                warn!(error = %err, "time sync begin failed");
            }
            // The receiver only disappears if the caller was cancelled.
            let _ = done_tx.send(());
        });

        let observes = self.poll_until_done(&mut done_rx).await;
        debug!(observes, "begin completed, ending time sync");

        let result = self.end().await;
        match &result {
            Ok(server_time) => info!(%server_time, observes, "time sync completed"),
            Err(err) => warn!(error = %err, observes, "time sync end failed"),
        }

        self.channel
            .metrics()
            .record_event(MetricEvent::TimeSync {
                observes,
                success: result.is_ok(),
            })
            .await;

        result
    }

    /// Issues `observe` on every tick until `done` fires (or its sender is
    /// dropped). Returns the number of observations sent.
    async fn poll_until_done(&self, done: &mut oneshot::Receiver<()>) -> u64 {
        let mut ticker = interval(non_zero_interval(self.channel.config().poll_interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut observes = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut *done => break,
                _ = ticker.tick() => {
                    observes += 1;
                    if let Err(err) = self.observe().await {
                        warn!(error = %err, "clock observe failed");
                    }
                }
            }
        }
        observes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::config::ConfigPreset;
    use crate::proxy::envelope::SignedEnvelope;
    use crate::proxy::metrics::{InMemoryMetricsCollector, MetricsCollector};
    use crate::proxy::random::SeededRandom;
    use crate::proxy::signature::Sha256Signer;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedTransport {
        begin_delay: Duration,
        begin_fails: bool,
        observe_fails: bool,
        end_fails: bool,
        sent: Mutex<Vec<SignedEnvelope>>,
    }

    impl ScriptedTransport {
        fn acts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.act.clone())
                .collect()
        }

        fn count(&self, act: &str) -> usize {
            self.acts().iter().filter(|a| *a == act).count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, _url: &str, envelope: &SignedEnvelope) -> Result<String, ProxyError> {
            self.sent.lock().unwrap().push(envelope.clone());
            let refused = || Err(ProxyError::Transport("connection refused".to_string()));

            match envelope.act.as_str() {
                "begin" => {
                    tokio::time::sleep(self.begin_delay).await;
                    if self.begin_fails { refused() } else { Ok(String::new()) }
                }
                "observe" => {
                    if self.observe_fails { refused() } else { Ok("ok".to_string()) }
                }
                "end" => {
                    if self.end_fails { refused() } else { Ok("42\n".to_string()) }
                }
                other => panic!("unexpected act {other:?}"),
            }
        }
    }

    fn session(transport: Arc<ScriptedTransport>, random: Arc<SeededRandom>) -> TimeSyncSession {
        TimeSyncSession::new(
            random,
            transport,
            Arc::new(Sha256Signer::new("secret")),
            Arc::new(ProxyConfig::from(ConfigPreset::Production)),
        )
    }

    #[tokio::test]
    async fn test_observes_while_begin_is_in_flight() {
        let transport = Arc::new(ScriptedTransport {
            begin_delay: Duration::from_millis(50),
            ..Default::default()
        });
        let session = session(Arc::clone(&transport), Arc::new(SeededRandom::from_seed(1)));

        let server_time = session.handle_server_time().await.unwrap();

        assert_eq!(server_time, "42");
        assert_eq!(transport.count("begin"), 1);
        assert_eq!(transport.count("end"), 1);
        assert!(transport.count("observe") >= 1);
        assert_eq!(transport.acts().last().map(String::as_str), Some("end"));
    }

    #[tokio::test]
    async fn test_envelopes_carry_timeout_slots() {
        let transport = Arc::new(ScriptedTransport {
            begin_delay: Duration::from_millis(5),
            ..Default::default()
        });
        let session = session(Arc::clone(&transport), Arc::new(SeededRandom::from_seed(2)));
        session.handle_server_time().await.unwrap();

        let signer = Sha256Signer::new("secret");
        for envelope in transport.sent.lock().unwrap().iter() {
            let value = serde_json::to_value(envelope).unwrap();
            let (path, timeout) = match envelope.act.as_str() {
                "observe" => ("/652/clock", 0),
                _ => ("/652/access", 250_000),
            };
            assert_eq!(value["Timeout"], serde_json::json!(timeout));
            signer
                .verify(path, &envelope.act, &envelope.nonce, &envelope.signature)
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_begin_and_observe_failures_are_swallowed() {
        let transport = Arc::new(ScriptedTransport {
            begin_delay: Duration::from_millis(10),
            begin_fails: true,
            observe_fails: true,
            ..Default::default()
        });
        let session = session(Arc::clone(&transport), Arc::new(SeededRandom::from_seed(3)));

        assert_eq!(session.handle_server_time().await.unwrap(), "42");
        assert_eq!(transport.count("end"), 1);
    }

    #[tokio::test]
    async fn test_end_failure_propagates() {
        let transport = Arc::new(ScriptedTransport {
            end_fails: true,
            ..Default::default()
        });
        let collector = Arc::new(InMemoryMetricsCollector::new());
        let channel = session(Arc::clone(&transport), Arc::new(SeededRandom::from_seed(4)))
            .channel()
            .clone()
            .with_metrics(collector.clone());
        let session = TimeSyncSession::from_channel(channel);

        let result = session.handle_server_time().await;
        assert!(matches!(result, Err(ProxyError::Transport(_))));
        assert_eq!(transport.count("end"), 1);

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.time_syncs_completed, 0);
        assert_eq!(metrics.time_syncs_failed, 1);
        assert_eq!(metrics.error_counts.transport, 1);
    }

    #[tokio::test]
    async fn test_time_sync_metrics() {
        let transport = Arc::new(ScriptedTransport {
            begin_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let collector = Arc::new(InMemoryMetricsCollector::new());
        let channel = session(Arc::clone(&transport), Arc::new(SeededRandom::from_seed(5)))
            .channel()
            .clone()
            .with_metrics(collector.clone());
        let session = TimeSyncSession::from_channel(channel);

        session.handle_server_time().await.unwrap();

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.time_syncs_completed, 1);
        assert_eq!(metrics.observes_sent as usize, transport.count("observe"));
        assert_eq!(metrics.max_observes_per_sync, metrics.observes_sent);
        assert_eq!(metrics.requests_sent as usize, transport.acts().len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_never_share_a_nonce() {
        let random = Arc::new(SeededRandom::from_seed(6));
        let transport = Arc::new(ScriptedTransport {
            begin_delay: Duration::from_millis(30),
            ..Default::default()
        });
        let first = session(Arc::clone(&transport), Arc::clone(&random));
        let second = session(Arc::clone(&transport), Arc::clone(&random));

        let (a, b) = tokio::join!(first.handle_server_time(), second.handle_server_time());
        assert_eq!(a.unwrap(), "42");
        assert_eq!(b.unwrap(), "42");

        let sent = transport.sent.lock().unwrap();
        let nonces: HashSet<&str> = sent.iter().map(|e| e.nonce.as_str()).collect();
        assert_eq!(nonces.len(), sent.len());
        assert_eq!(sent.iter().filter(|e| e.act == "end").count(), 2);
    }
}
