//! Destination host extraction and allow-listing.
//!
//! # Design Decisions
//! - Matching is case-insensitive and ignores the port
//! - `*.example.com` admits `example.com` and any subdomain of it
//! - An empty allow-list admits every host

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::ingress::response::tunnel_error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    Suffix(String),
}

/// Allow-list of destination hosts.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    patterns: Vec<HostPattern>,
}

impl HostFilter {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| match p.strip_prefix("*.") {
                Some(suffix) => HostPattern::Suffix(suffix.to_lowercase()),
                None => HostPattern::Exact(p.to_lowercase()),
            })
            .collect();
        Self { patterns }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether `host` (with or without a port) may be tunneled.
    pub fn allows(&self, host: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let name = strip_port(host).to_lowercase();
        self.patterns.iter().any(|pattern| match pattern {
            HostPattern::Exact(exact) => name == *exact,
            HostPattern::Suffix(suffix) => {
                name == *suffix
                    || name
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            }
        })
    }
}

/// Destination authority of an intercepted request, attached by
/// [`host_filter_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHost(pub String);

/// Destination authority: the absolute-form URI's authority, else `Host`.
pub fn target_host<B>(request: &Request<B>) -> Option<String> {
    if let Some(authority) = request.uri().authority() {
        return Some(authority.as_str().to_string());
    }
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn host_filter_middleware(
    State(filter): State<Arc<HostFilter>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(host) = target_host(&req) else {
        return tunnel_error(
            StatusCode::BAD_REQUEST,
            "missing_host",
            "request names no destination host",
        );
    };

    if !filter.allows(&host) {
        tracing::warn!(host = %host, method = %req.method(), "Destination host not allowed");
        return tunnel_error(
            StatusCode::FORBIDDEN,
            "host_not_allowed",
            &format!("host '{}' is not allowed", host),
        );
    }

    req.extensions_mut().insert(TargetHost(host));
    next.run(req).await
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map(|(ip, _)| ip).unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
