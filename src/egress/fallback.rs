//! Error-shaped replies for failed egress work.

use axum::http::{header, HeaderValue, Response, StatusCode};

use crate::wire::http1::{serialize_response, TUNNEL_ERROR_HEADER};

/// Serialized HTTP response describing an egress failure.
///
/// `kind` ends up in the `x-tunnel-error` header so the ingress caller can
/// tell a tunnel failure from an origin answering with the same status.
pub fn error_response(status: StatusCode, kind: &'static str, detail: &str) -> Vec<u8> {
    let mut response = Response::new(());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(TUNNEL_ERROR_HEADER, HeaderValue::from_static(kind));

    let (parts, _) = response.into_parts();
    serialize_response(&parts, detail.as_bytes())
}
