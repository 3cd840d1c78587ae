//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which half of the tunnel this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Local HTTP proxy; sends OUT envelopes and awaits IN replies.
    #[value(alias = "enter")]
    Ingress,
    /// Performs the real fetch for every OUT envelope and replies.
    #[value(alias = "exit")]
    Egress,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Ingress => f.write_str("ingress"),
            Role::Egress => f.write_str("egress"),
        }
    }
}

/// Root configuration for the tunnel.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    /// Ingress proxy listener.
    pub listener: ListenerConfig,

    /// Ingress request filtering and limits.
    pub ingress: IngressConfig,

    /// Egress fetch settings.
    pub egress: EgressConfig,

    /// Request/response correlation settings.
    pub correlation: CorrelationConfig,

    /// Message channel connecting the two peers.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Ingress-side request handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Hosts allowed through the tunnel. Entries are exact host names or
    /// `*.suffix` wildcards. Empty allows every host.
    pub allowed_hosts: Vec<String>,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Egress-side fetch behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EgressConfig {
    /// Total time allowed for one origin fetch in seconds.
    pub fetch_timeout_secs: u64,

    /// Destination ports relayed as raw byte streams instead of HTTP.
    pub raw_stream_ports: Vec<u16>,

    /// Raw streams are drained until no data arrives within this window.
    pub raw_read_deadline_ms: u64,

    /// Maximum buffered origin response body in bytes.
    pub max_response_bytes: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            raw_stream_ports: vec![443],
            raw_read_deadline_ms: 1000,
            max_response_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Correlation engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// How long an ingress caller waits for its IN envelope, in seconds.
    pub reply_timeout_secs: u64,

    /// Maximum number of in-flight requests.
    pub max_pending: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: 120,
            max_pending: 1024,
        }
    }
}

/// Chat relay transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Websocket URL of the chat relay.
    pub relay_url: String,

    /// Conversation both peers post into.
    pub chat_id: i64,

    /// Bearer token presented to the relay. Prefer `TUNNEL_AUTH_TOKEN`.
    pub auth_token: Option<String>,

    /// Longest message the relay accepts, in bytes.
    pub max_message_len: usize,

    /// Minimum spacing between sends once the burst is spent, in milliseconds.
    pub send_interval_ms: u64,

    /// Messages that may be sent back-to-back.
    pub send_burst: u32,

    /// Connection attempts before giving up at startup.
    pub connect_attempts: u32,

    /// Base delay for exponential connect backoff in milliseconds.
    pub connect_base_delay_ms: u64,

    /// Maximum connect backoff delay in milliseconds.
    pub connect_max_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:9000/chat".to_string(),
            chat_id: 0,
            auth_token: None,
            max_message_len: 1024 * 1024,
            send_interval_ms: 4000,
            send_burst: 5,
            connect_attempts: 5,
            connect_base_delay_ms: 500,
            connect_max_delay_ms: 10_000,
        }
    }
}

impl TransportConfig {
    /// Pause after the `failed`-th unsuccessful relay connect.
    ///
    /// The ceiling doubles from `connect_base_delay_ms` up to
    /// `connect_max_delay_ms`; the actual pause is drawn from the upper half
    /// of that ceiling so two peers restarting together drift apart.
    pub fn connect_delay(&self, failed: u32) -> Duration {
        if failed == 0 {
            return Duration::ZERO;
        }
        let doublings = (failed - 1).min(32);
        let ceiling = self
            .connect_base_delay_ms
            .saturating_mul(1u64 << doublings)
            .min(self.connect_max_delay_ms);
        if ceiling < 2 {
            return Duration::from_millis(ceiling);
        }
        Duration::from_millis(rand::thread_rng().gen_range(ceiling / 2..=ceiling))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
