//! HTTP tunnel over a chat transport.
//!
//! An ingress proxy serializes intercepted requests into
//! `direction;requestId;host;payload` envelopes posted to a shared
//! conversation; an egress peer fetches them and posts the replies back.

// Tunnel core
pub mod dispatch;
pub mod engine;
pub mod registry;
pub mod router;
pub mod wire;

// Edges
pub mod egress;
pub mod ingress;
pub mod transport;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::TunnelConfig;
pub use error::{TunnelError, TunnelResult};
pub use lifecycle::{Shutdown, Supervisor};
