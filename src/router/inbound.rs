//! Inbound message router.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::sync::broadcast;

use crate::config::{EgressConfig, Role};
use crate::dispatch::OutboundQueue;
use crate::egress::{error_response, Fetch};
use crate::error::{TunnelError, TunnelResult};
use crate::observability::metrics;
use crate::registry::PendingRegistry;
use crate::transport::{ConversationId, Inbound, InboundMessage};
use crate::wire::{decode_message, encode_message, Direction, Envelope};

/// What the router did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// A waiting ingress request was resolved.
    Resolved,
    /// The IN arrived after its waiter was gone.
    Late,
    /// An egress fetch was started.
    Dispatched,
    /// Not ours: another conversation or a direction this role does not serve.
    Ignored,
    /// Malformed and dropped.
    Discarded,
}

/// Per-role inbound handling.
enum Handler {
    Ingress {
        registry: PendingRegistry,
    },
    Egress {
        fetcher: Arc<dyn Fetch>,
        queue: OutboundQueue,
        fetch_timeout: Duration,
    },
}

/// Reads the transport's inbound stream and routes each envelope.
pub struct InboundRouter {
    conversation: ConversationId,
    handler: Handler,
}

impl InboundRouter {
    /// Router for the ingress role: IN envelopes resolve pending requests.
    pub fn ingress(conversation: ConversationId, registry: PendingRegistry) -> Self {
        Self {
            conversation,
            handler: Handler::Ingress { registry },
        }
    }

    /// Router for the egress role: OUT envelopes are fetched and answered.
    pub fn egress(
        conversation: ConversationId,
        fetcher: Arc<dyn Fetch>,
        queue: OutboundQueue,
        config: &EgressConfig,
    ) -> Self {
        Self {
            conversation,
            handler: Handler::Egress {
                fetcher,
                queue,
                fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            },
        }
    }

    pub fn role(&self) -> Role {
        match self.handler {
            Handler::Ingress { .. } => Role::Ingress,
            Handler::Egress { .. } => Role::Egress,
        }
    }

    /// Route messages until the stream ends or shutdown is signalled.
    ///
    /// A closed stream is reported as [`TunnelError::TransportClosed`].
    pub async fn run(
        self,
        mut inbound: Inbound,
        mut shutdown: broadcast::Receiver<()>,
    ) -> TunnelResult<()> {
        tracing::info!(role = %self.role(), conversation = %self.conversation, "Inbound router started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Inbound router received shutdown signal");
                    return Ok(());
                }
                next = inbound.recv() => match next {
                    Some(message) => {
                        self.route(message);
                    }
                    None => {
                        tracing::error!("Inbound stream closed");
                        return Err(TunnelError::TransportClosed);
                    }
                }
            }
        }
    }

    /// Handle a single inbound message.
    pub fn route(&self, message: InboundMessage) -> Routed {
        if message.conversation != self.conversation {
            tracing::trace!(conversation = %message.conversation, "Ignoring message from other conversation");
            return Routed::Ignored;
        }

        let envelope = match Envelope::decode(&message.text) {
            Ok(envelope) => envelope,
            Err(e) => {
                metrics::record_discarded("malformed");
                tracing::warn!(error = %e, len = message.text.len(), "Discarding malformed message");
                return Routed::Discarded;
            }
        };

        match (&self.handler, envelope.direction) {
            (Handler::Ingress { registry }, Direction::In) => {
                metrics::record_envelope_received(envelope.direction.as_str());
                match registry.resolve(&envelope.request_id, envelope.payload) {
                    Ok(()) => {
                        tracing::debug!(request_id = %envelope.request_id, "Reply delivered");
                        Routed::Resolved
                    }
                    Err(e) => {
                        metrics::record_discarded("late");
                        tracing::warn!(request_id = %envelope.request_id, error = %e, "Reply has no waiter");
                        Routed::Late
                    }
                }
            }
            (
                Handler::Egress {
                    fetcher,
                    queue,
                    fetch_timeout,
                },
                Direction::Out,
            ) => {
                metrics::record_envelope_received(envelope.direction.as_str());
                let fetcher = fetcher.clone();
                let queue = queue.clone();
                let fetch_timeout = *fetch_timeout;
                tokio::spawn(async move {
                    // The fetch runs in its own task so a panic in it still gets an IN.
                    let request = envelope.clone();
                    let fetch = tokio::spawn(async move {
                        serve_out(fetcher.as_ref(), &request, fetch_timeout).await
                    });
                    let reply = match fetch.await {
                        Ok(reply) => reply,
                        Err(e) => {
                            metrics::record_fetch("panic");
                            tracing::error!(request_id = %envelope.request_id, host = %envelope.host, error = %e, "Egress fetch task failed");
                            encode_message(&error_response(
                                StatusCode::INTERNAL_SERVER_ERROR,
                                "panic",
                                "egress fetch task failed",
                            ))
                        }
                    };
                    send_reply(&queue, &envelope, reply);
                });
                Routed::Dispatched
            }
            (_, direction) => {
                tracing::trace!(request_id = %envelope.request_id, direction = %direction, "Ignoring own-direction envelope");
                Routed::Ignored
            }
        }
    }
}

/// Produce the encoded IN payload answering one OUT envelope.
///
/// Never fails: every error becomes an error-shaped HTTP response.
pub async fn serve_out(fetcher: &dyn Fetch, envelope: &Envelope, fetch_timeout: Duration) -> String {
    let request = match decode_message(&envelope.payload) {
        Ok(request) => request,
        Err(e) => {
            metrics::record_fetch("bad_request");
            tracing::warn!(request_id = %envelope.request_id, error = %e, "Undecodable OUT payload");
            return encode_message(&error_response(StatusCode::BAD_REQUEST, "codec", &e.to_string()));
        }
    };

    let result = tokio::time::timeout(fetch_timeout, fetcher.fetch(&envelope.host, request)).await;
    let response = match result {
        Ok(Ok(response)) => {
            metrics::record_fetch("ok");
            tracing::debug!(request_id = %envelope.request_id, host = %envelope.host, len = response.len(), "Fetch complete");
            response
        }
        Ok(Err(TunnelError::Codec(detail))) => {
            metrics::record_fetch("bad_request");
            tracing::warn!(request_id = %envelope.request_id, error = %detail, "Unparseable tunneled request");
            error_response(StatusCode::BAD_REQUEST, "codec", &detail)
        }
        Ok(Err(e)) => {
            metrics::record_fetch("error");
            tracing::warn!(request_id = %envelope.request_id, host = %envelope.host, error = %e, "Fetch failed");
            error_response(StatusCode::BAD_GATEWAY, "fetch", &e.to_string())
        }
        Err(_) => {
            metrics::record_fetch("timeout");
            tracing::warn!(request_id = %envelope.request_id, host = %envelope.host, timeout = ?fetch_timeout, "Fetch timed out");
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                &format!("origin did not answer within {:?}", fetch_timeout),
            )
        }
    };
    encode_message(&response)
}

fn send_reply(queue: &OutboundQueue, request: &Envelope, payload: String) {
    match queue.enqueue(&request.reply(payload)) {
        Ok(()) => {}
        Err(TunnelError::MessageTooLarge { len, limit }) => {
            tracing::warn!(request_id = %request.request_id, len, limit, "Reply exceeds transport limit");
            let fallback = error_response(
                StatusCode::BAD_GATEWAY,
                "too_large",
                "response exceeds transport message limit",
            );
            if let Err(e) = queue.enqueue(&request.reply(encode_message(&fallback))) {
                tracing::error!(request_id = %request.request_id, error = %e, "Failed to enqueue fallback reply");
            }
        }
        Err(e) => {
            tracing::error!(request_id = %request.request_id, error = %e, "Failed to enqueue reply");
        }
    }
}
