//! HTTP/1.1 message framing.
//!
//! # Responsibilities
//! - Serialize a buffered request/response into HTTP/1.1 wire bytes
//! - Parse those bytes back into `http` types
//! - Strip hop-by-hop headers; they describe the proxy hop, not the message
//!
//! Bodies are always fully buffered. Serialization normalizes framing to
//! `Content-Length`; parsing additionally understands `chunked` so messages
//! produced by other HTTP/1.1 writers decode too.

use axum::http::{
    header, request, response, HeaderMap, HeaderName, HeaderValue, Method, Request, Response,
    StatusCode, Uri, Version,
};
use bytes::Bytes;

use crate::error::{TunnelError, TunnelResult};

/// Set on responses generated by the tunnel itself rather than an origin.
pub const TUNNEL_ERROR_HEADER: &str = "x-tunnel-error";

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// How to treat a message that declares no body framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unframed {
    /// Requests: no framing headers means no body.
    Empty,
    /// Responses: the body runs to the end of the bytes.
    RestOfMessage,
}

/// Serialize a buffered request in origin form.
pub fn serialize_request(parts: &request::Parts, body: &[u8]) -> Vec<u8> {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", parts.method, target).as_bytes());

    if !parts.headers.contains_key(header::HOST) {
        if let Some(authority) = parts.uri.authority() {
            out.extend_from_slice(format!("host: {}\r\n", authority).as_bytes());
        }
    }
    write_headers(&mut out, &parts.headers);

    let expects_body = matches!(parts.method, Method::POST | Method::PUT | Method::PATCH);
    if !body.is_empty() || expects_body {
        out.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Serialize a buffered response.
pub fn serialize_response(parts: &response::Parts, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            parts.status.as_u16(),
            parts.status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    write_headers(&mut out, &parts.headers);
    out.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Parse HTTP/1.x request bytes.
pub fn parse_request(bytes: &[u8]) -> TunnelResult<Request<Bytes>> {
    let (start_line, mut headers, rest) = split_head(bytes)?;

    let mut parts = start_line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(codec(format!("malformed request line '{}'", start_line))),
    };

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| codec(format!("invalid method: {}", e)))?;
    let uri: Uri = target
        .parse()
        .map_err(|e| codec(format!("invalid request target: {}", e)))?;
    let version = parse_version(version)?;
    let body = read_body(&mut headers, rest, Unframed::Empty, false)?;

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .version(version)
        .body(body)
        .map_err(|e| codec(e.to_string()))?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Parse HTTP/1.x response bytes.
pub fn parse_response(bytes: &[u8]) -> TunnelResult<Response<Bytes>> {
    let (status_line, mut headers, rest) = split_head(bytes)?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parse_version(parts.next().unwrap_or_default())?;
    let status = parts
        .next()
        .ok_or_else(|| codec(format!("malformed status line '{}'", status_line)))?;
    let status = StatusCode::from_bytes(status.as_bytes())
        .map_err(|e| codec(format!("invalid status code: {}", e)))?;

    let bodiless = matches!(status.as_u16(), 100..=199 | 204 | 304);
    let body = if bodiless {
        Bytes::new()
    } else {
        read_body(&mut headers, rest, Unframed::RestOfMessage, true)?
    };

    let mut response = Response::builder()
        .status(status)
        .version(version)
        .body(body)
        .map_err(|e| codec(e.to_string()))?;
    *response.headers_mut() = headers;
    Ok(response)
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn split_head(bytes: &[u8]) -> TunnelResult<(&str, HeaderMap, &[u8])> {
    let end = bytes
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .ok_or_else(|| codec("incomplete message head".into()))?;

    let head = std::str::from_utf8(&bytes[..end])
        .map_err(|_| codec("message head is not valid UTF-8".into()))?;
    let mut lines = head.split("\r\n");
    let start_line = lines.next().unwrap_or_default();

    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| codec(format!("malformed header line '{}'", line)))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| codec(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| codec(format!("invalid header value: {}", e)))?;
        headers.append(name, value);
    }

    Ok((start_line, headers, &bytes[end + HEAD_TERMINATOR.len()..]))
}

fn parse_version(raw: &str) -> TunnelResult<Version> {
    match raw {
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        other => Err(codec(format!("unsupported protocol version '{}'", other))),
    }
}

fn read_body(
    headers: &mut HeaderMap,
    rest: &[u8],
    unframed: Unframed,
    allow_bodiless: bool,
) -> TunnelResult<Bytes> {
    let chunked = headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"));

    if chunked {
        let body = dechunk(rest)?;
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        return Ok(Bytes::from(body));
    }

    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        let declared: usize = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| codec("invalid content-length".into()))?;
        return if rest.len() >= declared {
            Ok(Bytes::copy_from_slice(&rest[..declared]))
        } else if rest.is_empty() && allow_bodiless {
            // Answer to a HEAD request: length is declared, no body follows.
            Ok(Bytes::new())
        } else {
            Err(codec(format!(
                "truncated body: declared {} bytes, found {}",
                declared,
                rest.len()
            )))
        };
    }

    match unframed {
        Unframed::Empty => Ok(Bytes::new()),
        Unframed::RestOfMessage => Ok(Bytes::copy_from_slice(rest)),
    }
}

fn dechunk(mut data: &[u8]) -> TunnelResult<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| codec("unterminated chunk size line".into()))?;
        let size_line = std::str::from_utf8(&data[..line_end])
            .map_err(|_| codec("chunk size is not valid UTF-8".into()))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| codec(format!("invalid chunk size '{}'", size_hex)))?;
        data = &data[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        // `size` is untrusted; compare without adding to it.
        if size > data.len().saturating_sub(2) {
            return Err(codec(format!("truncated chunk: declared {} bytes", size)));
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

fn codec(msg: String) -> TunnelError {
    TunnelError::Codec(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip_keeps_end_to_end_headers() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("http://example.com/submit?x=1")
            .header("content-type", "text/plain")
            .header("proxy-connection", "keep-alive")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        let raw = serialize_request(&parts, b"payload");
        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.starts_with("POST /submit?x=1 HTTP/1.1\r\n"));
        assert!(text.contains("host: example.com\r\n"));
        assert!(!text.contains("proxy-connection"));

        let parsed = parse_request(&raw).unwrap();
        assert_eq!(parsed.method(), Method::POST);
        assert_eq!(parsed.uri(), "/submit?x=1");
        assert_eq!(parsed.headers()["host"], "example.com");
        assert_eq!(parsed.headers()["content-type"], "text/plain");
        assert_eq!(parsed.body().as_ref(), b"payload");
    }

    #[test]
    fn test_parse_foreign_request_without_body() {
        let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\nUser-Agent: Go-http-client/1.1\r\n\r\n";
        let parsed = parse_request(raw).unwrap();
        assert_eq!(parsed.method(), Method::GET);
        assert!(parsed.body().is_empty());
        assert_eq!(parsed.headers()["user-agent"], "Go-http-client/1.1");
    }

    #[test]
    fn test_response_round_trip() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .header("transfer-encoding", "chunked")
            .body(())
            .unwrap();
        let (parts, _) = response.into_parts();

        let raw = serialize_response(&parts, b"hello");
        assert!(raw.starts_with(b"HTTP/1.1 200 OK\r\n"));

        let parsed = parse_response(&raw).unwrap();
        assert_eq!(parsed.status(), StatusCode::OK);
        assert_eq!(parsed.body().as_ref(), b"hello");
        assert!(parsed.headers().get("transfer-encoding").is_none());
        assert_eq!(parsed.headers()["content-length"], "5");
    }

    #[test]
    fn test_parse_chunked_response() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n";
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.body().as_ref(), b"hello world");
        assert_eq!(parsed.headers()["content-length"], "11");
    }

    #[test]
    fn test_unframed_response_reads_to_end() {
        let parsed = parse_response(b"HTTP/1.0 200 OK\r\n\r\nall of it").unwrap();
        assert_eq!(parsed.version(), Version::HTTP_10);
        assert_eq!(parsed.body().as_ref(), b"all of it");
    }

    #[test]
    fn test_head_style_response_accepted() {
        let parsed = parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n").unwrap();
        assert!(parsed.body().is_empty());
    }

    #[test]
    fn test_malformed_messages_rejected() {
        assert!(parse_request(b"GET / HTTP/1.1\r\nHost: a").is_err());
        assert!(parse_request(b"GET /\r\n\r\n").is_err());
        assert!(parse_request(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").is_err());
        assert!(parse_response(b"HTTP/2 200 OK\r\n\r\n").is_err());
        assert!(parse_response(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
        assert!(parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").is_err());
        assert!(parse_response(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n").is_err());
    }

    #[test]
    fn test_oversized_chunk_size_is_codec_error() {
        let request = b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nabc\r\n0\r\n\r\n";
        assert!(matches!(parse_request(request), Err(TunnelError::Codec(_))));

        let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nabc\r\n0\r\n\r\n";
        assert!(matches!(parse_response(response), Err(TunnelError::Codec(_))));

        // One byte short of the declared size plus its CRLF.
        let short = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhell\r\n";
        assert!(matches!(parse_response(short), Err(TunnelError::Codec(_))));
    }
}
