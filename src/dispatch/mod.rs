//! Outbound dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! ingress request task ─┐
//! ingress request task ─┼─→ OutboundQueue::enqueue (encode, size check)
//! egress fetch task ────┘        │
//!                                ▼ unbounded mpsc (FIFO)
//!                     OutboundDispatcher::run (single consumer)
//!                                │
//!                                ▼
//!                        Transport::send, one at a time
//! ```
//!
//! # Design Decisions
//! - Exactly one writer touches the transport, preserving enqueue order
//! - A failed send stops the dispatcher; the supervisor decides what next

pub mod outbound;

pub use outbound::{channel, OutboundDispatcher, OutboundMessage, OutboundQueue};
