//! Outbound header construction.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from client input
//! - Overlay the target's injected headers
//!
//! # Design Decisions
//! - Headers named in `Connection` are hop-by-hop as well
//! - `Accept-Encoding` is dropped; the upstream body is relayed undecoded
//! - `Content-Length` is dropped; the client recomputes it for the new body
//! - Injected values replace every client value of the same name

use axum::http::header::{self, HeaderMap, HeaderName};

use crate::routing::target::TargetSpec;

/// Returns true for headers that must not cross the proxy.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

/// Client headers minus hop-by-hop headers.
pub fn sanitize_client_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut sanitized = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == header::ACCEPT_ENCODING || connection_listed.contains(name) {
            continue;
        }
        sanitized.append(name.clone(), value.clone());
    }
    sanitized
}

/// Headers for the upstream request to `target`.
pub fn outbound_headers(client: &HeaderMap, target: &TargetSpec) -> HeaderMap {
    let mut headers = if target.forward_client_headers {
        sanitize_client_headers(client)
    } else {
        HeaderMap::new()
    };

    for (name, value) in &target.inject_headers {
        headers.insert(name.clone(), value.clone());
    }
    headers
}
