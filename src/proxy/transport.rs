//! Timeout-bounded POST of signed envelopes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::envelope::SignedEnvelope;
use crate::ProxyError;

/// Delivers an envelope and returns the raw response body.
///
/// Any received response counts as success, whatever its status; only
/// serialization, connection, timeout and body-read failures are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `envelope` as JSON to `url`.
    async fn post(&self, url: &str, envelope: &SignedEnvelope) -> Result<String, ProxyError>;
}

/// [`Transport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, envelope: &SignedEnvelope) -> Result<String, ProxyError> {
        let body = serde_json::to_vec(envelope)?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(%url, %status, act = %envelope.act, "upstream answered with non-success status");
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::envelope::NumericSlot;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope() -> SignedEnvelope {
        SignedEnvelope {
            nonce: "abcdefghijklmnopqr".to_string(),
            act: "observe".to_string(),
            slot: NumericSlot::Timeout(0),
            signature: "sig".to_string(),
        }
    }

    #[tokio::test]
    async fn test_posts_json_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/652/clock"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "Nonce": "abcdefghijklmnopqr",
                "Act": "observe",
                "Timeout": 0,
                "Signature": "sig"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("1700000000\n"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(3)).unwrap();
        let body = transport
            .post(&format!("{}/652/clock", server.uri()), &envelope())
            .await
            .unwrap();

        assert_eq!(body, "1700000000\n");
    }

    #[tokio::test]
    async fn test_non_success_status_still_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad signature"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(3)).unwrap();
        let body = transport.post(&server.uri(), &envelope()).await.unwrap();

        assert_eq!(body, "bad signature");
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_millis(50)).unwrap();
        let result = transport.post(&server.uri(), &envelope()).await;

        assert!(matches!(result, Err(ProxyError::Timeout)));
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let result = transport
            .post(&format!("http://127.0.0.1:{port}/"), &envelope())
            .await;

        assert!(result.is_err());
    }
}
