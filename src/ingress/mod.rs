//! Ingress HTTP proxy.
//!
//! # Data Flow
//! ```text
//! HTTP client (proxy configured to this listener)
//!     → TraceLayer
//!     → host_filter.rs (destination host, allow-list → 403)
//!     → server.rs proxy_handler
//!         CONNECT            → 501
//!         buffer body        → 413 beyond ingress.max_body_size
//!         serialize HTTP/1.1 → CorrelationEngine::forward
//!         parse response     → client
//!     → response.rs (tunnel failures → status + x-tunnel-error)
//! ```
//!
//! # Design Decisions
//! - Absolute-form URIs name the destination; `Host` is the fallback
//! - Tunnel failures are distinguishable from origin statuses by header

pub mod host_filter;
pub mod response;
pub mod server;

pub use host_filter::{HostFilter, TargetHost};
pub use server::IngressServer;
