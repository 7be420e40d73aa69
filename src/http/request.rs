//! Request preparation for forwarding.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before the request leaves the proxy
//! - Record the client address in `X-Forwarded-For`
//! - Pin the outbound protocol version to what the upstream pool speaks
//!
//! # Design Decisions
//! - The inbound Host header is preserved
//! - Runs after the director, so the director's log reflects what the client sent

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::http::header::CONNECTION;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Version};

/// Header carrying the chain of client addresses.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Append `client` to any `X-Forwarded-For` chain already present.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let chain = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {client}", prior.join(", "))
    };

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Final touches on a directed request before it is sent upstream.
pub fn prepare_upstream(request: &mut Request<Body>, client: SocketAddr) {
    remove_hop_by_hop_headers(request.headers_mut());
    append_forwarded_for(request.headers_mut(), client.ip());
    *request.version_mut() = Version::HTTP_11;
}
