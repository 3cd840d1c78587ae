//! Message transport subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound dispatcher ── send(text) ──→ Transport ──→ chat relay / memory hub
//!
//! chat relay / memory hub ──→ reader task ──→ Inbound (mpsc) ──→ Inbound router
//!                                             InboundMessage { conversation, text }
//! ```
//!
//! # Design Decisions
//! - The core only needs "send an opaque string" and "receive an opaque
//!   string attributed to a conversation"
//! - Each transport exposes its message length bound so oversized envelopes
//!   are rejected before they reach the wire
//! - Only the dispatcher calls `send`; transports never see concurrent writers

pub mod memory;
pub mod pacing;
pub mod relay;

use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::TunnelResult;

pub use memory::{MemoryHub, MemoryTransport};
pub use relay::RelayTransport;

/// Identifier of the conversation both peers post into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message observed on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation: ConversationId,
    pub text: String,
}

/// Stream of messages received by one transport endpoint.
pub type Inbound = mpsc::UnboundedReceiver<InboundMessage>;

/// Sending half of a message channel.
pub trait Transport: Send + Sync + 'static {
    /// Post `text` into the configured conversation.
    fn send(&self, text: String) -> impl Future<Output = TunnelResult<()>> + Send;

    /// Longest message the transport accepts, if bounded.
    fn max_message_len(&self) -> Option<usize> {
        None
    }
}
