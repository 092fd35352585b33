//! NATS JetStream transport for the event intake.
//!
//! [`NatsOrderEventConsumer`] binds a durable pull consumer to the order
//! lifecycle stream and pumps each message into [`EventIntake::run`] as a
//! [`NatsDelivery`]. Settling maps onto JetStream acknowledgements:
//!
//! - [`IntakeOutcome::Ack`]: `+ACK`
//! - [`IntakeOutcome::Requeue`]: `-NAK`, redelivered by the server
//! - [`IntakeOutcome::Discard`]: `+TERM`, never redelivered
//!
//! `max_ack_pending` is set to the configured prefetch, so the server never
//! has more unacknowledged messages outstanding than the worker processes
//! concurrently.
//!
//! # Feature Gate
//!
//! This module is only available when the `nats` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! orderqueue-rs = { version = "0.1", features = ["nats"] }
//! ```

use super::{EventIntake, IntakeDelivery, IntakeOutcome, OrderEvent, shutdown_requested};
use crate::queue::config::IntakeConfig;
use crate::queue::store::QueueStore;
use async_nats::jetstream::{self, AckKind, consumer, stream};
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Errors raised while setting up or running the JetStream transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IntakeError {
    /// No broker URL was configured.
    #[error("event intake is disabled: no broker URL configured")]
    Disabled,

    /// The broker could not be reached.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Broker URL
        url: String,
        /// Underlying error
        message: String,
    },

    /// Stream or consumer could not be created.
    #[error("failed to set up {what}: {message}")]
    Setup {
        /// The object being created
        what: String,
        /// Underlying error
        message: String,
    },

    /// The message stream failed.
    #[error("message stream failed: {message}")]
    Stream {
        /// Underlying error
        message: String,
    },

    /// An event could not be published.
    #[error("failed to publish order event: {message}")]
    Publish {
        /// Underlying error
        message: String,
    },
}

/// A JetStream message awaiting settlement.
#[derive(Debug)]
pub struct NatsDelivery {
    message: jetstream::Message,
}

impl NatsDelivery {
    /// Subject the message arrived on.
    pub fn subject(&self) -> &str {
        self.message.subject.as_str()
    }
}

impl IntakeDelivery for NatsDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn settle(self, outcome: IntakeOutcome) -> impl Future<Output = ()> + Send {
        async move {
            let result = match outcome {
                IntakeOutcome::Ack => self.message.ack().await,
                IntakeOutcome::Requeue => self.message.ack_with(AckKind::Nak(None)).await,
                IntakeOutcome::Discard => self.message.ack_with(AckKind::Term).await,
            };
            if let Err(err) = result {
                // The server redelivers after its ack wait, handlers are idempotent.
                warn!(subject = %self.message.subject, %outcome, error = %err, "failed to settle JetStream message");
            }
        }
    }
}

/// Durable pull consumer feeding an [`EventIntake`].
pub struct NatsOrderEventConsumer {
    consumer: consumer::PullConsumer,
    consumer_name: String,
    prefetch: usize,
}

impl NatsOrderEventConsumer {
    /// Connects to the broker configured in `config` and binds the consumer.
    ///
    /// # Errors
    ///
    /// [`IntakeError::Disabled`] if `config.nats_url` is unset, otherwise a
    /// connection or setup error.
    pub async fn connect(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let url = config.nats_url.as_deref().ok_or(IntakeError::Disabled)?;
        let client = async_nats::connect(url)
            .await
            .map_err(|err| IntakeError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        info!(url, "connected to NATS");
        Self::bind(jetstream::new(client), config).await
    }

    /// Creates the stream (if missing) and the durable consumer on an
    /// existing JetStream context.
    pub async fn bind(
        context: jetstream::Context,
        config: &IntakeConfig,
    ) -> Result<Self, IntakeError> {
        let stream = context
            .get_or_create_stream(stream::Config {
                name: config.stream_name.clone(),
                subjects: config.subjects.clone(),
                ..Default::default()
            })
            .await
            .map_err(|err| IntakeError::Setup {
                what: format!("stream {}", config.stream_name),
                message: err.to_string(),
            })?;

        let prefetch = config.prefetch.max(1);
        let consumer: consumer::PullConsumer = stream
            .get_or_create_consumer(
                &config.consumer_name,
                consumer::pull::Config {
                    durable_name: Some(config.consumer_name.clone()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    max_ack_pending: i64::try_from(prefetch).unwrap_or(i64::MAX),
                    ..Default::default()
                },
            )
            .await
            .map_err(|err| IntakeError::Setup {
                what: format!("consumer {}", config.consumer_name),
                message: err.to_string(),
            })?;

        info!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            prefetch,
            "JetStream consumer bound"
        );
        Ok(Self {
            consumer,
            consumer_name: config.consumer_name.clone(),
            prefetch,
        })
    }

    /// Forwards messages into `deliveries` until `shutdown` turns `true`, the
    /// message stream ends or the receiving side goes away.
    pub async fn pump(
        self,
        deliveries: mpsc::Sender<NatsDelivery>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IntakeError> {
        let mut messages = self
            .consumer
            .messages()
            .await
            .map_err(|err| IntakeError::Stream {
                message: err.to_string(),
            })?;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                next = messages.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    trace!(subject = %message.subject, "JetStream message received");
                    if deliveries.send(NatsDelivery { message }).await.is_err() {
                        debug!("intake worker gone, stopping pump");
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(consumer = %self.consumer_name, error = %err, "JetStream message error");
                }
                None => {
                    warn!(consumer = %self.consumer_name, "JetStream message stream ended");
                    break;
                }
            }
        }

        info!(consumer = %self.consumer_name, "JetStream pump stopped");
        Ok(())
    }

    /// Spawns the pump and the intake worker on the current runtime.
    ///
    /// The returned task finishes after both have stopped; in-flight
    /// deliveries are settled before it completes.
    pub fn spawn<S>(
        self,
        intake: Arc<EventIntake<S>>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<(), IntakeError>>
    where
        S: QueueStore,
    {
        let (tx, rx) = mpsc::channel(self.prefetch);
        let worker = tokio::spawn(intake.run(rx, shutdown.clone()));

        tokio::spawn(async move {
            let pumped = self.pump(tx, shutdown).await;
            if let Err(err) = worker.await {
                warn!(error = %err, "intake worker task failed");
            }
            pumped
        })
    }
}

impl std::fmt::Debug for NatsOrderEventConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsOrderEventConsumer")
            .field("consumer_name", &self.consumer_name)
            .field("prefetch", &self.prefetch)
            .finish()
    }
}

/// Publishes `event` under its routing key and waits for the server ack.
///
/// This is what the order service does; it is exposed for demos and
/// integration environments.
pub async fn publish_order_event(
    context: &jetstream::Context,
    event: &OrderEvent,
) -> Result<(), IntakeError> {
    let payload = event.to_vec().map_err(|err| IntakeError::Publish {
        message: err.to_string(),
    })?;
    let payload: bytes::Bytes = payload.into();

    let ack = context
        .publish(event.routing_key(), payload)
        .await
        .map_err(|err| IntakeError::Publish {
            message: err.to_string(),
        })?;
    ack.await.map_err(|err| IntakeError::Publish {
        message: err.to_string(),
    })?;
    trace!(order_id = event.order_id, subject = %event.routing_key(), "order event published");
    Ok(())
}
