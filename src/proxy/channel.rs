//! Composition of random source, signer and transport into one signed call.

use std::sync::Arc;

use tracing::debug;

use super::config::ProxyConfig;
use super::envelope::{Action, SignedEnvelope};
use super::metrics::{MetricEvent, MetricsCollector, MetricsTimer, NoOpMetricsCollector};
use super::random::{RandomSource, SeededRandom};
use super::signature::{CredentialSigner, Sha256Signer};
use super::transport::{HttpTransport, Transport};
use crate::ProxyError;

/// The three injected collaborators of a session, plus configuration.
///
/// Each call to [`send`](Self::send) builds a new envelope: fresh nonce,
/// signature over the configured path of the action's endpoint, numeric
/// slot matching that endpoint. Cloning is cheap and shares every
/// collaborator.
#[derive(Clone)]
pub struct SignedChannel {
    random: Arc<dyn RandomSource>,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn CredentialSigner>,
    config: Arc<ProxyConfig>,
    metrics: Arc<dyn MetricsCollector>,
}

impl SignedChannel {
    /// Assembles a channel from explicit collaborators.
    pub fn new(
        random: Arc<dyn RandomSource>,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn CredentialSigner>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self {
            random,
            transport,
            signer,
            config,
            metrics: Arc::new(NoOpMetricsCollector::new()),
        }
    }

    /// Wires the production collaborators described by `config`: a
    /// time-seeded [`SeededRandom`], an [`HttpTransport`] bounded by the
    /// configured timeout and a [`Sha256Signer`] holding the configured
    /// secret.
    pub fn from_config(config: ProxyConfig) -> Result<Self, ProxyError> {
        let transport = HttpTransport::new(config.request_timeout)?;
        let signer = Sha256Signer::new(config.secret.clone());

        Ok(Self::new(
            Arc::new(SeededRandom::from_time_seed()),
            Arc::new(transport),
            Arc::new(signer),
            Arc::new(config),
        ))
    }

    /// Reports every request to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The configuration this channel signs and routes with.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The collector requests are reported to.
    pub fn metrics(&self) -> &Arc<dyn MetricsCollector> {
        &self.metrics
    }

    /// Signs `action` with `value` in its numeric slot and posts it.
    pub async fn send(&self, action: Action, value: i64) -> Result<String, ProxyError> {
        let endpoint = action.endpoint();
        let url = self.config.url(endpoint);
        let envelope = SignedEnvelope::sign(
            action,
            self.config.path(endpoint),
            value,
            self.random.as_ref(),
            self.signer.as_ref(),
        );

        debug!(%action, %url, value, signer = self.signer.name(), "sending signed request");

        let timer = MetricsTimer::new(Arc::clone(&self.metrics));
        let result = self.transport.post(&url, &envelope).await;

        timer
            .record(MetricEvent::Request {
                action,
                duration: timer.elapsed(),
                success: result.is_ok(),
            })
            .await;
        if let Err(err) = &result {
            timer
                .record(MetricEvent::Error {
                    error_code: err.code(),
                    error_message: err.to_string(),
                })
                .await;
        }

        result
    }
}

impl std::fmt::Debug for SignedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedChannel")
            .field("signer", &self.signer.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::config::ConfigPreset;
    use crate::proxy::envelope::NumericSlot;
    use crate::proxy::metrics::InMemoryMetricsCollector;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, SignedEnvelope)>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn post(&self, url: &str, envelope: &SignedEnvelope) -> Result<String, ProxyError> {
            self.sent
                .lock()
                .unwrap()
                .push((url.to_string(), envelope.clone()));
            if self.fail {
                Err(ProxyError::Transport("connection refused".to_string()))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn channel(transport: Arc<RecordingTransport>) -> SignedChannel {
        SignedChannel::new(
            Arc::new(SeededRandom::from_seed(1)),
            transport,
            Arc::new(Sha256Signer::new("secret")),
            Arc::new(ProxyConfig {
                base_url: "http://upstream.test".to_string(),
                ..ProxyConfig::from(ConfigPreset::Production)
            }),
        )
    }

    #[tokio::test]
    async fn test_send_routes_and_signs_by_action() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = channel(Arc::clone(&transport));
        let signer = Sha256Signer::new("secret");

        for (action, value) in [
            (Action::Begin, 250_000),
            (Action::Observe, 0),
            (Action::AuditFetch, 12),
        ] {
            assert_eq!(channel.send(action, value).await.unwrap(), "ok");
        }

        let sent = transport.sent.lock().unwrap();
        let expectations = [
            ("/652/access", "begin", NumericSlot::Timeout(250_000)),
            ("/652/clock", "observe", NumericSlot::Timeout(0)),
            ("/652/audit", "burble", NumericSlot::Offset(12)),
        ];
        for ((url, envelope), (path, act, slot)) in sent.iter().zip(expectations) {
            assert_eq!(url, &format!("http://upstream.test{path}"));
            assert_eq!(envelope.act, act);
            assert_eq!(envelope.slot, slot);
            signer
                .verify(path, act, &envelope.nonce, &envelope.signature)
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_send_reports_metrics() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let collector = Arc::new(InMemoryMetricsCollector::new());
        let channel = channel(transport).with_metrics(collector.clone());

        assert!(channel.send(Action::Observe, 0).await.is_err());

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.requests_sent, 1);
        assert_eq!(metrics.requests_failed, 1);
        assert_eq!(metrics.observes_sent, 1);
        assert_eq!(metrics.error_counts.transport, 1);
    }

    #[test]
    fn test_from_config_and_debug() {
        let channel = SignedChannel::from_config(ProxyConfig::from(ConfigPreset::Local)).unwrap();
        assert_eq!(channel.config().base_url, "http://localhost:8082");

        let debug = format!("{channel:?}");
        assert!(debug.contains("sha256-crlf"));
        assert!(!debug.contains("galumphing"));
    }
}
