//! Configuration validation.
//!
//! # Responsibilities
//! - Validate value ranges (port, grace period)
//! - Check the upstream URL is something we can forward to
//!
//! # Design Decisions
//! - Validation is a set of pure functions from raw values to typed ones
//! - Runs before config is accepted into the system

use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Ports the proxy may listen on.
pub const PORT_RANGE: RangeInclusive<i64> = 1024..=65535;

/// Accepted grace periods, in seconds.
pub const GRACE_RANGE: RangeInclusive<i64> = 5..=600;

/// A configuration value that failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid port number {0}, must be between {min} and {max}", min = PORT_RANGE.start(), max = PORT_RANGE.end())]
    Port(i64),

    #[error("invalid grace interval {0}, must be between {min} and {max} seconds", min = GRACE_RANGE.start(), max = GRACE_RANGE.end())]
    Grace(i64),

    #[error("invalid upstream URL {url:?}: {reason}")]
    Upstream { url: String, reason: String },
}

/// Check a listening port.
pub fn validate_port(port: i64) -> Result<u16, ValidationError> {
    if !PORT_RANGE.contains(&port) {
        return Err(ValidationError::Port(port));
    }
    u16::try_from(port).map_err(|_| ValidationError::Port(port))
}

/// Check a grace period given in seconds.
pub fn validate_grace(secs: i64) -> Result<Duration, ValidationError> {
    if !GRACE_RANGE.contains(&secs) {
        return Err(ValidationError::Grace(secs));
    }
    let secs = u64::try_from(secs).map_err(|_| ValidationError::Grace(secs))?;
    Ok(Duration::from_secs(secs))
}

/// Parse and check the upstream URL.
///
/// Only absolute `http` and `https` URLs with a host are accepted.
pub fn validate_upstream(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: &str| ValidationError::Upstream {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme {other:?}"))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}
