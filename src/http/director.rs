//! Request rewriting applied before a request leaves for the upstream.
//!
//! # Responsibilities
//! - Point the request URI at the upstream, keeping path and query
//! - Tag JSON object POST bodies with the Content-Type they arrived with
//! - Log every request before it is transmitted
//!
//! # Design Decisions
//! - Bodies that are not a JSON object are forwarded byte for byte
//! - A body read that fails part way is never forwarded as if complete
//! - JSON keys are re-serialized in sorted order

use std::str::FromStr;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;
use serde_json::{Map, Value};
use thiserror::Error;
use url::{Position, Url};

/// JSON field that receives the original Content-Type.
pub const CONTENT_TYPE_FIELD: &str = "contentType";

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Errors building upstream URIs.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("invalid upstream target {target}: {reason}")]
    Target { target: String, reason: String },

    #[error("cannot build upstream URI: {0}")]
    Uri(#[from] axum::http::Error),
}

/// Rewrites inbound requests into upstream-bound ones.
#[derive(Debug, Clone)]
pub struct Director {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: String,
}

impl Director {
    /// Create a director forwarding to `upstream`.
    pub fn new(upstream: &Url) -> Result<Self, DirectorError> {
        let invalid = |reason: String| DirectorError::Target {
            target: upstream.to_string(),
            reason,
        };

        let scheme = Scheme::from_str(upstream.scheme()).map_err(|e| invalid(e.to_string()))?;
        let authority = Authority::from_str(&upstream[Position::BeforeHost..Position::AfterPort])
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            scheme,
            authority,
            base_path: upstream.path().to_string(),
            base_query: upstream.query().unwrap_or_default().to_string(),
        })
    }

    /// Map an inbound URI onto the upstream.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, DirectorError> {
        let path = join_path(&self.base_path, uri.path());
        let query = join_query(&self.base_query, uri.query().unwrap_or_default());
        let path_and_query = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };

        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }

    /// Produce the request to send upstream.
    pub async fn direct(&self, request: Request<Body>) -> Result<Request<Body>, DirectorError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.rewrite_uri(&parts.uri)?;

        if parts.method != Method::POST {
            tracing::info!(
                version = ?parts.version,
                method = %parts.method,
                uri = %parts.uri,
                "Forwarding request"
            );
            return Ok(Request::from_parts(parts, body));
        }

        let body = if body.is_end_stream() {
            body
        } else {
            rewrite_body(&mut parts.headers, body).await
        };

        tracing::info!(
            version = ?parts.version,
            method = %parts.method,
            content_type = %joined_content_type(&parts.headers),
            uri = %parts.uri,
            "Forwarding request"
        );
        Ok(Request::from_parts(parts, body))
    }
}

/// All Content-Type values joined with `", "`.
pub fn joined_content_type(headers: &HeaderMap) -> String {
    headers
        .get_all(CONTENT_TYPE)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Join two paths with exactly one slash between them.
fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn join_query(base: &str, query: &str) -> String {
    if base.is_empty() || query.is_empty() {
        format!("{base}{query}")
    } else {
        format!("{base}&{query}")
    }
}

enum BodyRead {
    Complete(Bytes),
    Interrupted { prefix: Bytes, error: axum::Error },
}

async fn read_body(mut body: Body) -> BodyRead {
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    buf.extend_from_slice(&data);
                }
            }
            Err(error) => {
                return BodyRead::Interrupted {
                    prefix: buf.freeze(),
                    error,
                }
            }
        }
    }
    BodyRead::Complete(buf.freeze())
}

#[derive(Debug, Error)]
enum TagError {
    #[error("body is not a JSON object: {0}")]
    NotAnObject(#[source] serde_json::Error),

    #[error("failed to serialize tagged body: {0}")]
    Serialize(#[source] serde_json::Error),
}

fn tag_json_object(data: &[u8], content_type: &str) -> Result<Vec<u8>, TagError> {
    let mut object: Map<String, Value> =
        serde_json::from_slice(data).map_err(TagError::NotAnObject)?;
    object.insert(
        CONTENT_TYPE_FIELD.to_string(),
        Value::String(content_type.to_string()),
    );
    serde_json::to_vec(&object).map_err(TagError::Serialize)
}

async fn rewrite_body(headers: &mut HeaderMap, body: Body) -> Body {
    let data = match read_body(body).await {
        BodyRead::Complete(data) => data,
        BodyRead::Interrupted { prefix, error } => {
            tracing::warn!(
                error = %error,
                bytes_read = prefix.len(),
                "Request body ended without a clean end of stream, forwarding it unmodified"
            );
            // Replay what was read, then the error, so the upstream sees a broken body.
            return Body::from_stream(stream::iter([Ok::<_, axum::Error>(prefix), Err(error)]));
        }
    };

    match tag_json_object(&data, &joined_content_type(headers)) {
        Ok(tagged) => {
            headers.insert(CONTENT_TYPE, APPLICATION_JSON);
            headers.insert(CONTENT_LENGTH, HeaderValue::from(tagged.len()));
            headers.remove(TRANSFER_ENCODING);
            Body::from(tagged)
        }
        Err(e @ TagError::NotAnObject(_)) => {
            tracing::debug!(error = %e, "Forwarding body unmodified");
            Body::from(data)
        }
        Err(e @ TagError::Serialize(_)) => {
            tracing::warn!(error = %e, "Forwarding body unmodified");
            headers.remove(CONTENT_LENGTH);
            Body::from(data)
        }
    }
}
