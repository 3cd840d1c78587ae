//! Request/reply correlation.
//!
//! # Data Flow
//! ```text
//! ingress handler (host, raw request bytes)
//!     → RequestId::generate
//!     → PendingRegistry::register  (handle held for the whole exchange)
//!     → OutboundQueue::enqueue     (OUT envelope)
//!     → PendingHandle::wait        (reply timeout)
//!     → decode_message             (raw response bytes)
//! ```
//!
//! The egress half of the exchange has no blocking call; it lives in the
//! inbound router's OUT handling.

pub mod correlation;

pub use correlation::CorrelationEngine;
