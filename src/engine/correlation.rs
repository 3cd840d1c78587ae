//! Ingress side of the exchange: turn a request into an awaited reply.

use std::time::{Duration, Instant};

use crate::config::CorrelationConfig;
use crate::dispatch::OutboundQueue;
use crate::error::TunnelResult;
use crate::observability::metrics;
use crate::registry::PendingRegistry;
use crate::wire::{decode_message, encode_message, Envelope, RequestId};

/// Sends OUT envelopes and waits for the matching IN.
#[derive(Clone)]
pub struct CorrelationEngine {
    registry: PendingRegistry,
    queue: OutboundQueue,
    reply_timeout: Duration,
}

impl CorrelationEngine {
    pub fn new(registry: PendingRegistry, queue: OutboundQueue, config: &CorrelationConfig) -> Self {
        Self {
            registry,
            queue,
            reply_timeout: Duration::from_secs(config.reply_timeout_secs),
        }
    }

    /// Override the reply timeout.
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    /// Tunnel `request` to `host` and return the raw response bytes.
    ///
    /// The pending entry is registered before the OUT envelope is queued, so
    /// a reply can never overtake its registration. Dropping the returned
    /// future abandons the entry.
    pub async fn forward(&self, host: &str, request: &[u8]) -> TunnelResult<Vec<u8>> {
        let start = Instant::now();
        let result = self.exchange(host, request).await;
        match &result {
            Ok(_) => metrics::record_request("ok", start),
            Err(e) => metrics::record_request(e.kind(), start),
        }
        result
    }

    async fn exchange(&self, host: &str, request: &[u8]) -> TunnelResult<Vec<u8>> {
        let request_id = RequestId::generate();
        let handle = self.registry.register(request_id.clone())?;

        let envelope = Envelope::request(request_id, host, encode_message(request));
        self.queue.enqueue(&envelope)?;
        tracing::debug!(request_id = %envelope.request_id, host = %host, "Request tunneled");

        let payload = handle.wait(self.reply_timeout).await.inspect_err(|e| {
            tracing::warn!(request_id = %envelope.request_id, host = %host, error = %e, "No usable reply");
        })?;
        decode_message(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use crate::error::TunnelError;
    use crate::transport::{ConversationId, MemoryHub};
    use tokio::sync::broadcast;

    const CHAT: ConversationId = ConversationId(9);

    fn engine(hub: &MemoryHub, reply_timeout: Duration) -> (CorrelationEngine, broadcast::Sender<()>) {
        let (transport, _inbound) = hub.join(CHAT);
        let (queue, dispatcher) = dispatch::channel(transport);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(dispatcher.run(shutdown_rx));
        let engine = CorrelationEngine::new(PendingRegistry::new(), queue, &CorrelationConfig::default())
            .with_reply_timeout(reply_timeout);
        (engine, shutdown_tx)
    }

    #[tokio::test]
    async fn test_forward_sends_out_and_returns_reply() {
        let hub = MemoryHub::new();
        let (engine, _shutdown) = engine(&hub, Duration::from_secs(5));
        let (_peer, mut peer_rx) = hub.join(CHAT);
        let registry = engine.registry().clone();

        let forwarding = tokio::spawn({
            let engine = engine.clone();
            async move { engine.forward("example.com", b"GET / HTTP/1.1\r\n\r\n").await }
        });

        let message = peer_rx.recv().await.unwrap();
        let out = Envelope::decode(&message.text).unwrap();
        assert!(message.text.starts_with("OUT;"));
        assert_eq!(out.host, "example.com");
        assert_eq!(decode_message(&out.payload).unwrap(), b"GET / HTTP/1.1\r\n\r\n");
        assert!(registry.contains(&out.request_id));

        // No router in this test; resolve the way it would.
        let reply = out.reply(encode_message(b"HTTP/1.1 204 No Content\r\n\r\n"));
        registry.resolve(&reply.request_id, reply.payload).unwrap();

        let response = forwarding.await.unwrap().unwrap();
        assert_eq!(response, b"HTTP/1.1 204 No Content\r\n\r\n");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_forward_times_out_without_peer() {
        let hub = MemoryHub::new();
        let (engine, _shutdown) = engine(&hub, Duration::from_millis(100));

        let result = engine.forward("example.com", b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(matches!(result, Err(TunnelError::TimedOut { .. })));
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_forward_fails_when_dispatcher_stopped() {
        let hub = MemoryHub::new();
        let (engine, shutdown) = engine(&hub, Duration::from_secs(5));
        shutdown.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = engine.forward("example.com", b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(matches!(result, Err(TunnelError::TransportSend(_))));
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_reply_is_codec_error() {
        let hub = MemoryHub::new();
        let (engine, _shutdown) = engine(&hub, Duration::from_secs(5));
        let (_peer, mut peer_rx) = hub.join(CHAT);
        let registry = engine.registry().clone();

        let forwarding = tokio::spawn({
            let engine = engine.clone();
            async move { engine.forward("example.com", b"GET / HTTP/1.1\r\n\r\n").await }
        });

        let out = Envelope::decode(&peer_rx.recv().await.unwrap().text).unwrap();
        registry.resolve(&out.request_id, "!!".into()).unwrap();

        let result = forwarding.await.unwrap();
        assert!(matches!(result, Err(TunnelError::Codec(_))));
    }
}
