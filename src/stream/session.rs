//! Subscription sessions.
//!
//! A session is split into two halves that never touch the same mutable
//! state:
//!
//! - [`ConsumerSide`] owns the bus [`Subscription`] and the channel sender.
//!   It runs on its own task and blocks on the bus.
//! - [`FlushSide`] owns the channel receiver. It becomes the HTTP response
//!   body and blocks on the client.
//!
//! The bounded channel and a [`CancellationToken`] are the only things the
//! two halves share. Dropping the flush side (client gone) cancels the
//! session; the consumer unsubscribes on its next suspension point.

use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::bus::{BusError, BusMessage, BusResult, MessageBus, Subscription};
use crate::observability::metrics;

/// Subject of synthetic messages reporting bus errors in-band.
pub const SYSTEM_SUBJECT: &str = "gateway.system";

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Streaming,
    ClosedByClient,
    ClosedByBusError,
    ClosedByServerShutdown,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClosedByClient | Self::ClosedByBusError | Self::ClosedByServerShutdown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::ClosedByClient => "client",
            Self::ClosedByBusError => "bus_error",
            Self::ClosedByServerShutdown => "shutdown",
        }
    }
}

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound on a single bus receive before cancellation is re-checked.
    pub poll_interval: Duration,
    /// Messages buffered between the two halves.
    pub channel_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            channel_capacity: 1,
        }
    }
}

/// Build a system notification carrying `err` as its payload.
pub fn system_notice(err: &BusError) -> BusMessage {
    BusMessage::new(SYSTEM_SUBJECT).with_payload(err.to_string())
}

/// Create both halves of a session for `subject`.
///
/// The session token is a child of `shutdown`, so server shutdown ends it.
pub fn split(
    subject: &str,
    options: &SessionOptions,
    shutdown: &CancellationToken,
) -> (ConsumerSide, FlushSide) {
    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    let cancel = shutdown.child_token();

    let consumer = ConsumerSide {
        subject: subject.to_string(),
        tx,
        cancel: cancel.clone(),
        shutdown: shutdown.clone(),
        poll_interval: options.poll_interval,
    };
    let flush = FlushSide {
        rx,
        cancel: cancel.clone(),
        _guard: cancel.drop_guard(),
    };
    (consumer, flush)
}

/// Open a session: subscribe, hand the result to a spawned consumer and
/// return the flush side for the HTTP response.
///
/// The subscribe call completes before this returns, so anything published
/// after the client sees the response is delivered.
pub async fn open(
    bus: &dyn MessageBus,
    subject: &str,
    options: &SessionOptions,
    shutdown: &CancellationToken,
) -> FlushSide {
    tracing::debug!(subject = %subject, state = ?SessionState::Starting, "Opening subscription session");

    let setup = bus.subscribe(subject).await;
    let (consumer, flush) = split(subject, options, shutdown);

    metrics::session_opened();
    tokio::spawn(async move {
        let subject = consumer.subject.clone();
        let state = consumer.run(setup).await;
        tracing::info!(subject = %subject, state = ?state, "Subscription session closed");
        metrics::session_closed(state.as_str());
    });

    flush
}

/// The bus-facing half of a session.
pub struct ConsumerSide {
    subject: String,
    tx: mpsc::Sender<BusMessage>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl ConsumerSide {
    /// Pump messages from the subscription into the channel until the
    /// session ends, then release the subscription.
    ///
    /// `setup` is the outcome of the subscribe call; a failure there is
    /// reported once and ends the session.
    pub async fn run(self, setup: BusResult<Box<dyn Subscription>>) -> SessionState {
        let mut subscription = match setup {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!(subject = %self.subject, error = %err, "Subscription setup failed");
                self.push_notice(&err).await;
                self.cancel.cancel();
                return SessionState::ClosedByBusError;
            }
        };

        tracing::debug!(subject = %self.subject, state = ?SessionState::Streaming, "Subscription established");

        let state = loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break self.cancelled_state(),
                next = subscription.next_message(self.poll_interval) => next,
            };

            match next {
                Ok(message) => {
                    if !self.push(message).await {
                        break self.cancelled_state();
                    }
                    metrics::record_stream_event("message");
                }
                // Liveness poll: nothing arrived, look at cancellation again.
                Err(BusError::Timeout) => continue,
                Err(BusError::Closed) => {
                    tracing::warn!(subject = %self.subject, "Subscription closed by the bus");
                    self.push_notice(&BusError::Closed).await;
                    self.cancel.cancel();
                    break SessionState::ClosedByBusError;
                }
                Err(err) => {
                    tracing::warn!(subject = %self.subject, error = %err, "Receive failed, stream continues");
                    if !self.push_notice(&err).await {
                        break self.cancelled_state();
                    }
                }
            }
        };

        if let Err(e) = subscription.unsubscribe().await {
            tracing::debug!(subject = %self.subject, error = %e, "Unsubscribe failed");
        }
        state
    }

    /// Hand `message` to the flush side. Returns false once the session is over.
    async fn push(&self, message: BusMessage) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(message) => sent.is_ok(),
        }
    }

    async fn push_notice(&self, err: &BusError) -> bool {
        let pushed = self.push(system_notice(err)).await;
        if pushed {
            metrics::record_stream_event("system");
        }
        pushed
    }

    fn cancelled_state(&self) -> SessionState {
        if self.shutdown.is_cancelled() {
            SessionState::ClosedByServerShutdown
        } else {
            SessionState::ClosedByClient
        }
    }
}

/// The HTTP-facing half of a session.
///
/// Dropping it cancels the session.
pub struct FlushSide {
    rx: mpsc::Receiver<BusMessage>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl FlushSide {
    /// Next message to write, or `None` once the session is over.
    ///
    /// A message already in the channel wins over cancellation, so a
    /// notice pushed right before the consumer cancels is still delivered.
    pub async fn next_message(&mut self) -> Option<BusMessage> {
        tokio::select! {
            biased;
            message = self.rx.recv() => message,
            _ = self.cancel.cancelled() => None,
        }
    }

    /// Turn this half into a stream of messages in bus order.
    pub fn into_stream(self) -> impl Stream<Item = BusMessage> + Send + 'static {
        futures_util::stream::unfold(self, |mut flush| async move {
            flush.next_message().await.map(|message| (message, flush))
        })
    }
}
