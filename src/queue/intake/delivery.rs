use std::future::Future;
use tokio::sync::oneshot;

/// How a delivery is settled with its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntakeOutcome {
    /// Processed, or deliberately skipped. Never redelivered.
    Ack,
    /// Transient failure. The transport should redeliver.
    Requeue,
    /// Poison message. Dropped without redelivery.
    Discard,
}

impl IntakeOutcome {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeOutcome::Ack => "ack",
            IntakeOutcome::Requeue => "requeue",
            IntakeOutcome::Discard => "discard",
        }
    }
}

impl std::fmt::Display for IntakeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message handed to the event intake by some transport.
pub trait IntakeDelivery: Send + 'static {
    /// Raw message body.
    fn payload(&self) -> &[u8];

    /// Reports the processing outcome back to the transport.
    fn settle(self, outcome: IntakeOutcome) -> impl Future<Output = ()> + Send;
}

/// In-process delivery whose outcome is reported over a oneshot channel.
#[derive(Debug)]
pub struct ChannelDelivery {
    payload: Vec<u8>,
    reply: Option<oneshot::Sender<IntakeOutcome>>,
}

impl ChannelDelivery {
    /// Creates a delivery and the receiver its outcome will arrive on.
    ///
    /// The receiver errors if the delivery is dropped unsettled, which
    /// happens to deliveries still buffered when the intake shuts down.
    pub fn new(payload: impl Into<Vec<u8>>) -> (Self, oneshot::Receiver<IntakeOutcome>) {
        let (reply, outcome) = oneshot::channel();
        (
            Self {
                payload: payload.into(),
                reply: Some(reply),
            },
            outcome,
        )
    }

    /// Creates a delivery nobody waits on.
    pub fn detached(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            reply: None,
        }
    }
}

impl IntakeDelivery for ChannelDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn settle(self, outcome: IntakeOutcome) -> impl Future<Output = ()> + Send {
        if let Some(reply) = self.reply {
            // The producer may have stopped waiting.
            let _ = reply.send(outcome);
        }
        std::future::ready(())
    }
}
