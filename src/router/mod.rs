//! Inbound routing subsystem.
//!
//! # Data Flow
//! ```text
//! transport inbound stream
//!     → conversation filter (other chats ignored)
//!     → Envelope::decode (malformed: logged, counted, skipped)
//!     → role + direction
//!         ingress + IN  → PendingRegistry::resolve
//!         egress  + OUT → spawned task: decode → Fetch → encode → enqueue IN
//!         otherwise     → ignored (our own echoes)
//! ```
//!
//! # Design Decisions
//! - One bad message never ends the loop
//! - Egress work runs on its own task so a slow origin cannot stall routing
//! - Every OUT gets exactly one IN, error-shaped if anything failed

pub mod inbound;

pub use inbound::{InboundRouter, Routed};
