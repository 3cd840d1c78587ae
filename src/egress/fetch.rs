//! Origin access for decoded OUT envelopes.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, Uri, Version};
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::EgressConfig;
use crate::error::{TunnelError, TunnelResult};
use crate::wire::http1;

/// Performs the network access for one tunneled request.
///
/// Object safe so the router can hold `Arc<dyn Fetch>` and tests can swap in
/// canned origins.
pub trait Fetch: Send + Sync + 'static {
    /// Deliver `request` to `host` and return the raw reply bytes.
    fn fetch<'a>(&'a self, host: &'a str, request: Vec<u8>) -> BoxFuture<'a, TunnelResult<Vec<u8>>>;
}

/// Fetches from real origins: HTTP/1.1 through a pooled client, or raw TCP
/// for ports configured as opaque streams.
pub struct OriginFetcher {
    client: Client<HttpConnector, Body>,
    config: EgressConfig,
}

impl OriginFetcher {
    pub fn new(config: EgressConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, config }
    }

    fn uses_raw_stream(&self, host: &str) -> bool {
        port_of(host).is_some_and(|port| self.config.raw_stream_ports.contains(&port))
    }

    async fn fetch_http(&self, host: &str, raw: &[u8]) -> TunnelResult<Vec<u8>> {
        let request = http1::parse_request(raw)?;
        let (mut parts, body) = request.into_parts();

        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        parts.uri = format!("http://{}{}", host, target)
            .parse::<Uri>()
            .map_err(|e| TunnelError::Fetch(format!("invalid origin uri for '{}': {}", host, e)))?;
        parts.version = Version::HTTP_11;
        if !parts.headers.contains_key(header::HOST) {
            let value = HeaderValue::from_str(host)
                .map_err(|e| TunnelError::Fetch(format!("invalid host '{}': {}", host, e)))?;
            parts.headers.insert(header::HOST, value);
        }

        tracing::debug!(host = %host, method = %parts.method, uri = %parts.uri, "Fetching from origin");

        let response: Response<Incoming> = self
            .client
            .request(Request::from_parts(parts, Body::from(body)))
            .await
            .map_err(|e| TunnelError::Fetch(format!("origin request to '{}' failed: {}", host, e)))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.config.max_response_bytes)
            .await
            .map_err(|e| TunnelError::Fetch(format!("reading origin body failed: {}", e)))?;

        Ok(http1::serialize_response(&parts, &body))
    }

    async fn fetch_raw(&self, host: &str, raw: &[u8]) -> TunnelResult<Vec<u8>> {
        let mut stream = TcpStream::connect(host)
            .await
            .map_err(|e| TunnelError::Fetch(format!("connect to '{}' failed: {}", host, e)))?;
        stream
            .write_all(raw)
            .await
            .map_err(|e| TunnelError::Fetch(format!("write to '{}' failed: {}", host, e)))?;

        tracing::debug!(host = %host, written = raw.len(), "Draining raw stream");
        drain(
            &mut stream,
            Duration::from_millis(self.config.raw_read_deadline_ms),
            self.config.max_response_bytes,
        )
        .await
    }
}

impl Fetch for OriginFetcher {
    fn fetch<'a>(&'a self, host: &'a str, request: Vec<u8>) -> BoxFuture<'a, TunnelResult<Vec<u8>>> {
        Box::pin(async move {
            if self.uses_raw_stream(host) {
                self.fetch_raw(host, &request).await
            } else {
                self.fetch_http(host, &request).await
            }
        })
    }
}

/// Read until the peer closes, goes quiet for `deadline`, or `limit` bytes
/// have arrived.
///
/// A read error after some data has arrived ends the drain with what was read.
pub async fn drain<R>(reader: &mut R, deadline: Duration, limit: usize) -> TunnelResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match tokio::time::timeout(deadline, reader.read(&mut buf)).await {
            Err(_) | Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                data.extend_from_slice(&buf[..n]);
                if data.len() >= limit {
                    data.truncate(limit);
                    break;
                }
            }
            Ok(Err(e)) if data.is_empty() => {
                return Err(TunnelError::Fetch(format!("raw stream read failed: {}", e)));
            }
            Ok(Err(_)) => break,
        }
    }
    Ok(data)
}

fn port_of(host: &str) -> Option<u16> {
    host.rsplit_once(':').and_then(|(_, port)| port.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn spawn_origin(reply: &'static [u8]) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(reply).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[test]
    fn test_port_of() {
        assert_eq!(port_of("example.com:443"), Some(443));
        assert_eq!(port_of("[::1]:8080"), Some(8080));
        assert_eq!(port_of("example.com"), None);
    }

    #[tokio::test]
    async fn test_fetch_http_origin() {
        let addr = spawn_origin(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello").await;
        let fetcher = OriginFetcher::new(EgressConfig {
            raw_stream_ports: vec![],
            ..EgressConfig::default()
        });

        let raw = fetcher
            .fetch(&addr.to_string(), b"GET /greeting HTTP/1.1\r\n\r\n".to_vec())
            .await
            .unwrap();
        let response = http1::parse_response(&raw).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_request() {
        let fetcher = OriginFetcher::new(EgressConfig::default());
        let result = fetcher.fetch("example.com", b"not http".to_vec()).await;
        assert!(matches!(result, Err(TunnelError::Codec(_))));
    }

    #[tokio::test]
    async fn test_fetch_raw_stream() {
        let addr = spawn_origin(b"\x16\x03\x01opaque").await;
        let fetcher = OriginFetcher::new(EgressConfig {
            raw_stream_ports: vec![addr.port()],
            raw_read_deadline_ms: 200,
            ..EgressConfig::default()
        });

        let raw = fetcher.fetch(&addr.to_string(), b"\x16\x03\x01hello".to_vec()).await.unwrap();
        assert_eq!(raw, b"\x16\x03\x01opaque");
    }

    #[tokio::test]
    async fn test_fetch_unreachable_origin() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = OriginFetcher::new(EgressConfig::default());
        let result = fetcher
            .fetch(&addr.to_string(), b"GET / HTTP/1.1\r\n\r\n".to_vec())
            .await;
        assert!(matches!(result, Err(TunnelError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_drain_stops_when_quiet() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"partial").await.unwrap();

        let data = drain(&mut server, Duration::from_millis(50), 1024).await.unwrap();
        assert_eq!(data, b"partial");
        drop(client);
    }

    #[tokio::test]
    async fn test_drain_respects_limit() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"0123456789").await.unwrap();

        let data = drain(&mut server, Duration::from_millis(50), 4).await.unwrap();
        assert_eq!(data, b"0123");
    }
}
