//! Responses handed back to the proxied client.
//!
//! # Responsibilities
//! - Turn a tunneled HTTP response into an axum response
//! - Map tunnel failures to statuses a client can tell apart

use axum::{
    body::Body,
    http::{header, HeaderValue, Response as HttpResponse, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::error::TunnelError;
use crate::wire::http1::TUNNEL_ERROR_HEADER;

/// Status for a failed exchange.
pub fn status_for(error: &TunnelError) -> StatusCode {
    match error {
        TunnelError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        TunnelError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        TunnelError::MessageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        TunnelError::TooManyPending(_) | TunnelError::TransportSend(_) | TunnelError::Shutdown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Plain-text response generated by the tunnel, tagged with `kind`.
pub fn tunnel_error(status: StatusCode, kind: &'static str, detail: &str) -> Response {
    let mut response = (status, detail.to_string()).into_response();
    response
        .headers_mut()
        .insert(TUNNEL_ERROR_HEADER, HeaderValue::from_static(kind));
    response
}

/// Response for a failed exchange.
pub fn from_error(error: &TunnelError) -> Response {
    tunnel_error(status_for(error), error.kind(), &error.to_string())
}

/// Response for a reply parsed off the tunnel.
pub fn from_tunneled(response: HttpResponse<Bytes>) -> Response {
    let (mut parts, body) = response.into_parts();
    // Framing is re-established by the server for this hop.
    parts.headers.remove(header::TRANSFER_ENCODING);
    parts.headers.remove(header::CONNECTION);
    Response::from_parts(parts, Body::from(body))
}
