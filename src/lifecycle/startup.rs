//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Signal handlers are installed before the first connection is accepted
//! - Returns only after the drain has finished

use thiserror::Error;

use crate::config::ProxyConfig;
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::SignalWatcher;
use crate::net::{Listener, ListenerError};

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Run the proxy until it has shut down.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let listener = Listener::bind(&config.listener).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let watcher = SignalWatcher::install()
        .map_err(StartupError::Signals)?
        .spawn(shutdown.clone());

    let result = server.run(listener, shutdown).await;

    // The watcher returns as soon as the server starts draining.
    if let Err(e) = watcher.await {
        tracing::warn!(error = %e, "Signal watcher task failed");
    }

    result.map_err(StartupError::from)
}
