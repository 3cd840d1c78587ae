//! Egress network access.
//!
//! # Data Flow
//! ```text
//! OUT envelope (decoded request bytes, host)
//!     → fetch.rs
//!         port in raw_stream_ports? → raw TCP: write bytes, drain until quiet
//!         otherwise                 → parse HTTP/1.1, hyper client, serialize response
//!     → response bytes
//!
//! Any failure
//!     → fallback.rs (error-shaped HTTP response) so a reply is always sent
//! ```

pub mod fallback;
pub mod fetch;

pub use fallback::error_response;
pub use fetch::{Fetch, OriginFetcher};
