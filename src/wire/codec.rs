//! Payload encoding for a text-only transport.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::error::{TunnelError, TunnelResult};

/// Encode raw HTTP message bytes into a transport-legal payload string.
pub fn encode_message(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(bytes)
}

/// Decode a payload string produced by [`encode_message`].
pub fn decode_message(payload: &str) -> TunnelResult<Vec<u8>> {
    STANDARD_NO_PAD
        .decode(payload)
        .map_err(|e| TunnelError::Codec(format!("invalid payload: {}", e)))
}
