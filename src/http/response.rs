//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn the upstream response into the client response
//! - Handle response streaming efficiently
//! - Map upstream failures to 502 Bad Gateway

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;

use crate::http::request::remove_hop_by_hop_headers;

/// Relay an upstream response. The body is streamed, never buffered.
pub fn from_upstream(response: Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    remove_hop_by_hop_headers(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// Response sent when the upstream could not be reached.
pub fn bad_gateway() -> Response {
    StatusCode::BAD_GATEWAY.into_response()
}
