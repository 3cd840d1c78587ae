//! Error taxonomy for the tunnel core.

use std::time::Duration;
use thiserror::Error;

use crate::wire::RequestId;

/// Errors produced while moving a request through the tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// A payload or HTTP message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A transport message is not a well-formed envelope.
    #[error("envelope parse error: {0}")]
    EnvelopeParse(String),

    /// A request id was registered while an entry for it was still pending.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),

    /// No reply arrived before the deadline.
    #[error("no reply for request {request_id} within {after:?}")]
    TimedOut { request_id: RequestId, after: Duration },

    /// A reply arrived for an id that is not (or no longer) pending.
    #[error("no pending request with id {0}")]
    NotFound(RequestId),

    /// The registry is at capacity.
    #[error("too many pending requests (limit {0})")]
    TooManyPending(usize),

    /// An encoded envelope exceeds what the transport accepts.
    #[error("message of {len} bytes exceeds transport limit of {limit} bytes")]
    MessageTooLarge { len: usize, limit: usize },

    /// The transport rejected or failed to deliver a message.
    #[error("transport send failed: {0}")]
    TransportSend(String),

    /// The inbound side of the transport closed.
    #[error("transport closed")]
    TransportClosed,

    /// The egress-side network call failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The tunnel is shutting down.
    #[error("tunnel is shutting down")]
    Shutdown,

    /// A supervised task panicked or was cancelled.
    #[error("supervised task failed: {0}")]
    Task(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Short stable label, used for metrics and the `x-tunnel-error` header.
    pub fn kind(&self) -> &'static str {
        match self {
            TunnelError::Codec(_) => "codec",
            TunnelError::EnvelopeParse(_) => "envelope",
            TunnelError::DuplicateRequestId(_) => "duplicate_id",
            TunnelError::TimedOut { .. } => "timeout",
            TunnelError::NotFound(_) => "not_found",
            TunnelError::TooManyPending(_) => "too_many_pending",
            TunnelError::MessageTooLarge { .. } => "too_large",
            TunnelError::TransportSend(_) => "transport_send",
            TunnelError::TransportClosed => "transport_closed",
            TunnelError::Fetch(_) => "fetch",
            TunnelError::Shutdown => "shutdown",
            TunnelError::Task(_) => "task",
            TunnelError::Io(_) => "io",
        }
    }
}

/// Result type for tunnel operations.
pub type TunnelResult<T> = Result<T, TunnelError>;
