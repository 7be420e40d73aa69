//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields, one per proxied request)
//!     → tower-http TraceLayer spans around each request
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, filtered by RUST_LOG)
//! ```

pub mod logging;
