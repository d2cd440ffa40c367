//! Remote configurator over HTTP.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::{DEFAULT_TIMEOUT, Envelope, Sender, rapid_options};
use crate::config::ServiceIdentity;
use crate::error::{Error, Result};
use crate::model::Outcome;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Posts each variant as a configure envelope. HTTP 200 is success.
pub struct HttpSender {
    client: reqwest::Client,
    endpoint: String,
    identity: ServiceIdentity,
    api_key: Option<SecretString>,
}

impl HttpSender {
    pub fn new(endpoint: impl Into<String>, identity: ServiceIdentity) -> Result<Self> {
        Self::with_timeout(endpoint, identity, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        identity: ServiceIdentity,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            identity,
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    async fn post(&self, payload: &str) -> Outcome {
        let options = match rapid_options(payload) {
            Ok(options) => options,
            Err(e) => {
                return Outcome::Failure {
                    status: None,
                    body: e.to_string(),
                };
            }
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&Envelope::new(&self.identity, options));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return transport_outcome(e),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return transport_outcome(e),
        };

        if status == 200 {
            Outcome::Success { status, body }
        } else {
            Outcome::Failure {
                status: Some(status),
                body,
            }
        }
    }
}

fn transport_outcome(e: reqwest::Error) -> Outcome {
    if e.is_timeout() {
        Outcome::Timeout
    } else {
        warn!(error = %e, "configurator request failed");
        Outcome::Failure {
            status: None,
            body: e.to_string(),
        }
    }
}

#[async_trait]
impl Sender for HttpSender {
    async fn send(&self, payload: &str) -> Outcome {
        let start = Instant::now();
        let outcome = self.post(payload).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(outcome = outcome.label(), elapsed_ms, "configure request finished");
        metrics::send_outcomes().add(1, &[KeyValue::new("outcome", outcome.label())]);
        metrics::send_duration_ms().record(elapsed_ms, &[KeyValue::new("outcome", outcome.label())]);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::tests::identity;
    use mockito::Matcher;

    #[tokio::test]
    async fn status_200_is_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/configure")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "partNumber": "OfficeTable",
                "rapidOptions": [{"name": "Glass", "value": true, "dataType": 2}]
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let sender = HttpSender::new(format!("{}/configure", server.url()), identity()).unwrap();
        let outcome = sender.send(r#"{"Glass":true}"#).await;

        mock.assert_async().await;
        assert_eq!(
            outcome,
            Outcome::Success {
                status: 200,
                body: r#"{"ok":true}"#.to_string()
            }
        );
    }

    #[tokio::test]
    async fn other_status_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(201)
            .with_body("created")
            .create_async()
            .await;

        let sender = HttpSender::new(server.url(), identity()).unwrap();
        let outcome = sender.send(r#"{"Color":"Red"}"#).await;
        assert_eq!(
            outcome,
            Outcome::Failure {
                status: Some(201),
                body: "created".to_string()
            }
        );
    }

    #[tokio::test]
    async fn bearer_token_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .create_async()
            .await;

        let sender = HttpSender::new(server.url(), identity())
            .unwrap()
            .api_key(SecretString::from("s3cret"));
        assert!(sender.send(r#"{"Color":"Red"}"#).await.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let sender = HttpSender::with_timeout(
            format!("http://{addr}/"),
            identity(),
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(sender.send(r#"{"Color":"Red"}"#).await, Outcome::Timeout);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_failure_without_status() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let sender = HttpSender::new(format!("http://{addr}/"), identity()).unwrap();
        match sender.send(r#"{"Color":"Red"}"#).await {
            Outcome::Failure { status: None, .. } => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_failure() {
        let sender = HttpSender::new("http://127.0.0.1:9/", identity()).unwrap();
        match sender.send("not json").await {
            Outcome::Failure { status: None, body } => assert!(body.contains("invalid")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
