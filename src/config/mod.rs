//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line / environment (TYPEPROXY_*)
//!     → loader.rs (clap parse, args win over env)
//!     → validation.rs (port, grace and upstream checks)
//!     → ProxyConfig (validated, immutable)
//!     → passed by value to listener, director and server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - Timeouts are derived from the grace period, never configured directly
//! - Validation errors are fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{Cli, ConfigError};
pub use schema::{ListenerConfig, PoolConfig, ProxyConfig};
pub use validation::ValidationError;
