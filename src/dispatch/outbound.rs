//! Single-writer outbound queue.

use tokio::sync::{broadcast, mpsc};

use crate::error::{TunnelError, TunnelResult};
use crate::observability::metrics;
use crate::transport::Transport;
use crate::wire::{Direction, Envelope, RequestId};

/// An encoded envelope waiting for the transport.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub direction: Direction,
    pub request_id: RequestId,
    pub text: String,
}

/// Producer handle. Cheap to clone; never blocks.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    max_message_len: Option<usize>,
}

impl OutboundQueue {
    /// Encode `envelope` and queue it behind everything enqueued before.
    pub fn enqueue(&self, envelope: &Envelope) -> TunnelResult<()> {
        let text = envelope.encode()?;
        if let Some(limit) = self.max_message_len {
            if text.len() > limit {
                return Err(TunnelError::MessageTooLarge {
                    len: text.len(),
                    limit,
                });
            }
        }

        self.tx
            .send(OutboundMessage {
                direction: envelope.direction,
                request_id: envelope.request_id.clone(),
                text,
            })
            .map_err(|_| TunnelError::TransportSend("outbound dispatcher stopped".into()))
    }

    /// Longest encoded envelope the transport accepts.
    pub fn max_message_len(&self) -> Option<usize> {
        self.max_message_len
    }

    /// Whether the dispatcher has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The single consumer that owns the transport's sending half.
pub struct OutboundDispatcher<T> {
    rx: mpsc::UnboundedReceiver<OutboundMessage>,
    transport: T,
}

/// Create a queue and the dispatcher draining it into `transport`.
pub fn channel<T: Transport>(transport: T) -> (OutboundQueue, OutboundDispatcher<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = OutboundQueue {
        tx,
        max_message_len: transport.max_message_len(),
    };
    (queue, OutboundDispatcher { rx, transport })
}

impl<T: Transport> OutboundDispatcher<T> {
    /// Forward queued messages one at a time until every producer is gone,
    /// shutdown is signalled, or a send fails.
    ///
    /// Consumes the dispatcher, so two drain loops can never race.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> TunnelResult<()> {
        tracing::info!("Outbound dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Outbound dispatcher received shutdown signal");
                    return Ok(());
                }
                next = self.rx.recv() => match next {
                    Some(message) => self.deliver(message).await?,
                    None => {
                        tracing::info!("All producers gone, outbound dispatcher exiting");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn deliver(&self, message: OutboundMessage) -> TunnelResult<()> {
        let len = message.text.len();
        match self.transport.send(message.text).await {
            Ok(()) => {
                metrics::record_envelope_sent(message.direction.as_str());
                tracing::debug!(
                    request_id = %message.request_id,
                    direction = %message.direction,
                    len,
                    "Envelope sent"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    request_id = %message.request_id,
                    direction = %message.direction,
                    error = %e,
                    "Transport send failed, stopping dispatcher"
                );
                Err(match e {
                    TunnelError::TransportSend(_) => e,
                    other => TunnelError::TransportSend(other.to_string()),
                })
            }
        }
    }
}
