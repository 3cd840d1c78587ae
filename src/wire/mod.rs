//! Wire codec subsystem.
//!
//! # Data Flow
//! ```text
//! http::Request / http::Response
//!     → http1.rs (HTTP/1.1 bytes, Content-Length framing)
//!     → codec.rs (base64, no padding: transport-safe text)
//!     → envelope.rs ("direction;requestId;host;payload")
//!     → one transport message
//! ```
//!
//! # Design Decisions
//! - The envelope format is the interop contract between the two peers
//! - Decoding fails loudly; a misparsed envelope could resume the wrong caller
//! - Base64 never emits the `;` delimiter

pub mod codec;
pub mod envelope;
pub mod http1;

pub use codec::{decode_message, encode_message};
pub use envelope::{Direction, Envelope, RequestId, FIELD_DELIMITER};
