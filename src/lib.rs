//! Transparent HTTP forwarding proxy.
//!
//! Every inbound request is relayed to one fixed upstream origin. POST bodies
//! that are JSON objects gain a `contentType` field holding the Content-Type
//! they arrived with, and are sent on as `application/json`. Termination
//! signals start a drain bounded by the configured grace period.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
