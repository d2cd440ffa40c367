//! In-process configurator engines.
//!
//! An engine receives the same rapid options the HTTP envelope carries and
//! answers synchronously. Calls run on the blocking pool and are abandoned
//! (not cancelled) once the timeout passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use super::{DEFAULT_TIMEOUT, RapidOption, Sender, rapid_options};
use crate::model::Outcome;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// What an engine answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReply {
    pub status: u16,
    pub body: String,
}

/// A configurator engine living in this process.
pub trait Configurator: Send + Sync + 'static {
    fn configure(&self, options: &[RapidOption]) -> Result<EngineReply, String>;
}

impl<F> Configurator for F
where
    F: Fn(&[RapidOption]) -> Result<EngineReply, String> + Send + Sync + 'static,
{
    fn configure(&self, options: &[RapidOption]) -> Result<EngineReply, String> {
        self(options)
    }
}

/// Sender backed by an in-process [`Configurator`].
pub struct EngineSender<C> {
    engine: Arc<C>,
    timeout: Duration,
}

impl<C: Configurator> EngineSender<C> {
    pub fn new(engine: C) -> Self {
        Self::with_timeout(engine, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(engine: C, timeout: Duration) -> Self {
        Self {
            engine: Arc::new(engine),
            timeout,
        }
    }

    async fn call(&self, payload: &str) -> Outcome {
        let options = match rapid_options(payload) {
            Ok(options) => options,
            Err(e) => {
                return Outcome::Failure {
                    status: None,
                    body: e.to_string(),
                };
            }
        };

        let engine = Arc::clone(&self.engine);
        let call = tokio::task::spawn_blocking(move || engine.configure(&options));

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Outcome::Timeout,
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "configurator engine panicked");
                Outcome::Failure {
                    status: None,
                    body: join_err.to_string(),
                }
            }
            Ok(Ok(Err(engine_err))) => Outcome::Failure {
                status: None,
                body: engine_err,
            },
            Ok(Ok(Ok(reply))) if reply.status == 200 => Outcome::Success {
                status: reply.status,
                body: reply.body,
            },
            Ok(Ok(Ok(reply))) => Outcome::Failure {
                status: Some(reply.status),
                body: reply.body,
            },
        }
    }
}

#[async_trait]
impl<C: Configurator> Sender for EngineSender<C> {
    async fn send(&self, payload: &str) -> Outcome {
        let start = Instant::now();
        let outcome = self.call(payload).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        metrics::send_outcomes().add(1, &[KeyValue::new("outcome", outcome.label())]);
        metrics::send_duration_ms().record(elapsed_ms, &[KeyValue::new("outcome", outcome.label())]);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::DataType;

    fn ok_engine(options: &[RapidOption]) -> Result<EngineReply, String> {
        Ok(EngineReply {
            status: 200,
            body: format!("{} options", options.len()),
        })
    }

    #[tokio::test]
    async fn engine_sees_rapid_options() {
        let sender = EngineSender::new(|options: &[RapidOption]| -> Result<EngineReply, String> {
            let glass = options.iter().find(|o| o.name == "Glass").unwrap();
            assert_eq!(glass.data_type, DataType::Boolean);
            Ok(EngineReply {
                status: 200,
                body: "configured".into(),
            })
        });

        let outcome = sender.send(r#"{"Color":"Red","Glass":true}"#).await;
        assert_eq!(
            outcome,
            Outcome::Success {
                status: 200,
                body: "configured".into()
            }
        );
    }

    #[tokio::test]
    async fn function_engine_counts_options() {
        let sender = EngineSender::new(ok_engine);
        assert_eq!(
            sender.send(r#"{"A":1,"B":2}"#).await,
            Outcome::Success {
                status: 200,
                body: "2 options".into()
            }
        );
    }

    #[tokio::test]
    async fn engine_error_and_bad_status_are_failures() {
        let failing = EngineSender::new(|_: &[RapidOption]| -> Result<EngineReply, String> {
            Err("rule violation".to_string())
        });
        assert_eq!(
            failing.send("{}").await,
            Outcome::Failure {
                status: None,
                body: "rule violation".into()
            }
        );

        let rejecting = EngineSender::new(|_: &[RapidOption]| -> Result<EngineReply, String> {
            Ok(EngineReply {
                status: 422,
                body: "invalid".into(),
            })
        });
        assert_eq!(
            rejecting.send("{}").await,
            Outcome::Failure {
                status: Some(422),
                body: "invalid".into()
            }
        );
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let sender = EngineSender::with_timeout(
            |_: &[RapidOption]| -> Result<EngineReply, String> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(EngineReply {
                    status: 200,
                    body: String::new(),
                })
            },
            Duration::from_millis(20),
        );
        assert_eq!(sender.send("{}").await, Outcome::Timeout);
    }

    #[tokio::test]
    async fn panicking_engine_is_failure() {
        let sender = EngineSender::new(|_: &[RapidOption]| -> Result<EngineReply, String> {
            panic!("engine crashed")
        });
        assert!(matches!(
            sender.send("{}").await,
            Outcome::Failure { status: None, .. }
        ));
    }
}
