//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Bind listener → Install signals → Serve
//!
//! Shutdown (shutdown.rs):
//!     Running → Draining (signal or accept loop exit, first one wins)
//!             → Stopped (all connections done, or grace period elapsed)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then listener, then traffic
//! - Ordered shutdown: stop accept, drain, force close
//! - Shutdown has timeout: remaining connections are aborted at the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownReason, ShutdownState};
pub use signals::{SignalWatcher, TerminationSignal};
