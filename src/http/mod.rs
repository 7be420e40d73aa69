//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper auto connection, Axum router)
//!     → director.rs (upstream URI, JSON body tagging, request log)
//!     → request.rs (hop-by-hop headers, X-Forwarded-For)
//!     → client.rs (pooled upstream client)
//!     → egress.rs (optional HTTP_PROXY / HTTPS_PROXY hop)
//!     → response.rs (stream upstream response back)
//!     → Send to client
//! ```

pub mod client;
pub mod director;
pub mod egress;
pub mod request;
pub mod response;
pub mod server;

pub use director::{Director, DirectorError};
pub use server::{HttpServer, ServerError};
