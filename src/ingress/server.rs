//! Ingress HTTP server.
//!
//! # Responsibilities
//! - Build the axum router with tracing and the host filter
//! - Buffer and serialize each intercepted request
//! - Hand it to the correlation engine and relay the reply
//! - Stop accepting on shutdown

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::config::IngressConfig;
use crate::engine::CorrelationEngine;
use crate::ingress::host_filter::{host_filter_middleware, HostFilter, TargetHost};
use crate::ingress::response::{from_error, from_tunneled, tunnel_error};
use crate::wire::http1;

/// State injected into the proxy handler.
#[derive(Clone)]
pub struct IngressState {
    pub engine: CorrelationEngine,
    pub max_body_size: usize,
}

/// Forward-proxy front end of the tunnel.
pub struct IngressServer {
    router: Router,
}

impl IngressServer {
    pub fn new(engine: CorrelationEngine, config: &IngressConfig) -> Self {
        let state = IngressState {
            engine,
            max_body_size: config.max_body_size,
        };
        let filter = Arc::new(HostFilter::new(&config.allowed_hosts));
        Self {
            router: Self::build_router(state, filter),
        }
    }

    fn build_router(state: IngressState, filter: Arc<HostFilter>) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(middleware::from_fn_with_state(filter, host_filter_middleware))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::VIA,
                HeaderValue::from_static("1.1 chat-tunnel"),
            ))
            .layer(TraceLayer::new_for_http())
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Ingress proxy listening");

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Ingress proxy stopped");
        Ok(())
    }
}

async fn proxy_handler(
    State(state): State<IngressState>,
    Extension(TargetHost(host)): Extension<TargetHost>,
    request: Request<Body>,
) -> Response {
    if request.method() == Method::CONNECT {
        return tunnel_error(
            StatusCode::NOT_IMPLEMENTED,
            "connect_unsupported",
            "CONNECT tunnels are not supported",
        );
    }

    let (parts, body) = request.into_parts();
    tracing::debug!(method = %parts.method, host = %host, uri = %parts.uri, "Intercepted request");

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "Request body rejected");
            return tunnel_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "body_too_large",
                &format!("request body exceeds {} bytes", state.max_body_size),
            );
        }
    };

    let raw = http1::serialize_request(&parts, &body);
    let reply = match state.engine.forward(&host, &raw).await {
        Ok(reply) => reply,
        Err(e) => return from_error(&e),
    };

    match http1::parse_response(&reply) {
        Ok(response) => from_tunneled(response),
        Err(e) => {
            tracing::warn!(host = %host, error = %e, len = reply.len(), "Unparseable tunneled response");
            from_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrelationConfig, EgressConfig};
    use crate::dispatch;
    use crate::egress::Fetch;
    use crate::error::TunnelResult;
    use crate::registry::PendingRegistry;
    use crate::router::InboundRouter;
    use crate::transport::{ConversationId, MemoryHub};
    use crate::wire::http1::TUNNEL_ERROR_HEADER;
    use futures_util::future::BoxFuture;
    use std::time::Duration;
    use tower::ServiceExt;

    const CHAT: ConversationId = ConversationId(3);

    struct Greeter;

    impl Fetch for Greeter {
        fn fetch<'a>(&'a self, host: &'a str, request: Vec<u8>) -> BoxFuture<'a, TunnelResult<Vec<u8>>> {
            Box::pin(async move {
                let parsed = http1::parse_request(&request)?;
                let body = format!("hello {} {}", host, parsed.uri().path());
                Ok(format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\nx-origin: yes\r\n\r\n{}", body.len(), body).into_bytes())
            })
        }
    }

    /// Ingress router on `hub`, optionally with an egress peer serving it.
    fn ingress(
        hub: &MemoryHub,
        config: IngressConfig,
        with_egress: bool,
        reply_timeout: Duration,
    ) -> (Router, broadcast::Sender<()>) {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let registry = PendingRegistry::new();
        let (transport, inbound) = hub.join(CHAT);
        let (queue, dispatcher) = dispatch::channel(transport);
        tokio::spawn(dispatcher.run(shutdown_tx.subscribe()));
        tokio::spawn(InboundRouter::ingress(CHAT, registry.clone()).run(inbound, shutdown_tx.subscribe()));

        if with_egress {
            let (transport, inbound) = hub.join(CHAT);
            let (queue, dispatcher) = dispatch::channel(transport);
            tokio::spawn(dispatcher.run(shutdown_tx.subscribe()));
            let router = InboundRouter::egress(CHAT, Arc::new(Greeter), queue, &EgressConfig::default());
            tokio::spawn(router.run(inbound, shutdown_tx.subscribe()));
        }

        let engine = CorrelationEngine::new(registry, queue, &CorrelationConfig::default())
            .with_reply_timeout(reply_timeout);
        (IngressServer::new(engine, &config).into_router(), shutdown_tx)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_through_tunnel() {
        let hub = MemoryHub::new();
        let (app, _shutdown) = ingress(&hub, IngressConfig::default(), true, Duration::from_secs(5));

        let response = app.oneshot(get("http://example.com/index.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-origin"], "yes");
        assert_eq!(response.headers()[header::VIA], "1.1 chat-tunnel");

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body.as_ref(), b"hello example.com /index.html");
    }

    #[tokio::test]
    async fn test_no_egress_times_out() {
        let hub = MemoryHub::new();
        let (app, _shutdown) = ingress(&hub, IngressConfig::default(), false, Duration::from_millis(200));

        let response = app.oneshot(get("http://example.com/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.headers()[TUNNEL_ERROR_HEADER], "timeout");
    }

    #[tokio::test]
    async fn test_disallowed_host_forbidden() {
        let hub = MemoryHub::new();
        let config = IngressConfig {
            allowed_hosts: vec!["*.ycombinator.com".into()],
            ..IngressConfig::default()
        };
        let (app, _shutdown) = ingress(&hub, config, true, Duration::from_secs(5));

        let response = app.oneshot(get("http://example.com/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[TUNNEL_ERROR_HEADER], "host_not_allowed");
    }

    #[tokio::test]
    async fn test_connect_not_implemented() {
        let hub = MemoryHub::new();
        let (app, _shutdown) = ingress(&hub, IngressConfig::default(), true, Duration::from_secs(5));

        let request = Request::builder()
            .method(Method::CONNECT)
            .uri("example.com:443")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let hub = MemoryHub::new();
        let config = IngressConfig {
            max_body_size: 16,
            ..IngressConfig::default()
        };
        let (app, _shutdown) = ingress(&hub, config, true, Duration::from_secs(5));

        let request = Request::builder()
            .method(Method::POST)
            .uri("http://example.com/upload")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[TUNNEL_ERROR_HEADER], "body_too_large");
    }
}
