//! typeproxy
//!
//! Forwards all HTTP traffic to a single upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ net::listener ─▶ http::server              │
//!                           │                      │                       │
//!                           │                      ▼                       │
//!                           │               http::director                 │
//!                           │        (upstream URI, JSON body tagging)     │
//!                           │                      │                       │
//!                           │                      ▼                       │
//!     Client Response       │               http::client  ─────────────────┼──▶ Upstream
//!     ◀─────────────────────┼── http::response ◀───┘                       │
//!                           │                                              │
//!                           │  lifecycle: signals → shutdown → drain       │
//!                           └──────────────────────────────────────────────┘
//! ```

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use typeproxy::config::{Cli, ProxyConfig};
use typeproxy::lifecycle::startup;
use typeproxy::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = match ProxyConfig::try_from(Cli::parse()) {
        Ok(config) => config,
        Err(e) => Cli::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    tracing::info!("typeproxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        port = config.listener.port,
        upstream = %config.upstream,
        grace = ?config.grace,
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
