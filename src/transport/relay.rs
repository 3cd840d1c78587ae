//! Websocket chat relay client.
//!
//! # Responsibilities
//! - Connect to the relay (bearer token, exponential backoff)
//! - Post envelopes as chat messages, paced for the relay's rate limits
//! - Surface every received chat message on the inbound stream
//!
//! # Frame Format
//! ```text
//! {"chat_id": -100123, "text": "OUT;3f2a...;example.com;R0VUIC8g..."}
//! ```
//! The same JSON shape is used in both directions. Messages from every
//! conversation are forwarded; filtering is the router's job.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::TransportConfig;
use crate::error::{TunnelError, TunnelResult};
use crate::observability::metrics;
use crate::transport::pacing::Pacer;
use crate::transport::{ConversationId, Inbound, InboundMessage, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize, Deserialize)]
struct ChatFrame {
    chat_id: i64,
    text: String,
}

/// Sending half of a relay connection.
pub struct RelayTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    chat_id: i64,
    pacer: Pacer,
    max_message_len: usize,
}

impl RelayTransport {
    /// Connect to the relay and spawn the reader task.
    pub async fn connect(config: &TransportConfig) -> TunnelResult<(Self, Inbound)> {
        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match open(config).await {
                Ok(stream) => break stream,
                Err(e) if attempt < config.connect_attempts => {
                    let delay = config.connect_delay(attempt);
                    tracing::warn!(attempt, delay = ?delay, error = %e, "Relay connect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            relay = %config.relay_url,
            chat_id = config.chat_id,
            "Connected to chat relay"
        );

        let (sink, stream) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_frames(stream, tx));

        let transport = Self {
            sink: Mutex::new(sink),
            chat_id: config.chat_id,
            pacer: Pacer::new(
                config.send_burst,
                Duration::from_millis(config.send_interval_ms),
            ),
            max_message_len: config.max_message_len,
        };
        Ok((transport, rx))
    }
}

impl Transport for RelayTransport {
    async fn send(&self, text: String) -> TunnelResult<()> {
        let frame = serde_json::to_string(&ChatFrame {
            chat_id: self.chat_id,
            text,
        })
        .map_err(|e| TunnelError::TransportSend(e.to_string()))?;

        self.pacer.acquire().await;
        self.sink
            .lock()
            .await
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TunnelError::TransportSend(e.to_string()))
    }

    fn max_message_len(&self) -> Option<usize> {
        Some(self.max_message_len)
    }
}

async fn open(config: &TransportConfig) -> TunnelResult<WsStream> {
    let mut request = config
        .relay_url
        .as_str()
        .into_client_request()
        .map_err(|e| TunnelError::TransportSend(format!("invalid relay URL: {}", e)))?;

    if let Some(token) = &config.auth_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| TunnelError::TransportSend("auth token is not a valid header".into()))?;
        request.headers_mut().insert(header::AUTHORIZATION, value);
    }

    let (stream, _) = connect_async(request)
        .await
        .map_err(|e| TunnelError::TransportSend(format!("relay connect failed: {}", e)))?;
    Ok(stream)
}

async fn read_frames(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<InboundMessage>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_frame(text.as_str()) {
                Some(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                None => metrics::record_discarded("relay_frame"),
            },
            Ok(Message::Close(reason)) => {
                tracing::info!(reason = ?reason, "Relay closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Relay read failed");
                break;
            }
        }
    }
    tracing::info!("Relay reader stopped");
}

fn parse_frame(text: &str) -> Option<InboundMessage> {
    match serde_json::from_str::<ChatFrame>(text) {
        Ok(frame) => Some(InboundMessage {
            conversation: ConversationId(frame.chat_id),
            text: frame.text,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring non-chat relay frame");
            None
        }
    }
}
