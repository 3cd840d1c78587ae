//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use chat_tunnel::config::TunnelConfig;
use chat_tunnel::egress::OriginFetcher;
use chat_tunnel::transport::{ConversationId, MemoryHub};
use chat_tunnel::{Shutdown, Supervisor};

pub const CHAT_ID: i64 = -100_200;

/// Start a mock origin answering every request with `status` and `body`.
pub async fn start_mock_origin(status: u16, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    500 => "Internal Server Error",
                    _ => "",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a mock origin answering `200` with the request target as the body.
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]);
                let target = head.split(' ').nth(1).unwrap_or("").to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    target.len(),
                    target
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

pub fn test_config() -> TunnelConfig {
    let mut config = TunnelConfig::default();
    config.transport.chat_id = CHAT_ID;
    config
}

/// A running ingress proxy, optionally paired with an egress peer.
pub struct Tunnel {
    pub proxy_addr: SocketAddr,
    pub hub: MemoryHub,
    shutdowns: Vec<Shutdown>,
}

impl Tunnel {
    pub async fn start(config: TunnelConfig, with_egress: bool) -> Self {
        let hub = MemoryHub::new();
        let conversation = ConversationId(config.transport.chat_id);
        let mut shutdowns = Vec::new();

        if with_egress {
            let (transport, inbound) = hub.join(conversation);
            let fetcher = Arc::new(OriginFetcher::new(config.egress.clone()));
            let supervisor = Supervisor::new(config.clone());
            shutdowns.push(supervisor.shutdown_handle());
            tokio::spawn(supervisor.run_egress(transport, inbound, fetcher));
        }

        let (transport, inbound) = hub.join(conversation);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap();
        let supervisor = Supervisor::new(config);
        shutdowns.push(supervisor.shutdown_handle());
        tokio::spawn(supervisor.run_ingress(transport, inbound, listener));

        // Let the listener task start accepting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            proxy_addr,
            hub,
            shutdowns,
        }
    }

    /// HTTP client sending everything through the ingress proxy.
    pub fn client(&self) -> reqwest::Client {
        let proxy = reqwest::Proxy::http(format!("http://{}", self.proxy_addr)).unwrap();
        reqwest::Client::builder()
            .proxy(proxy)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        for shutdown in &self.shutdowns {
            shutdown.trigger();
        }
    }
}
