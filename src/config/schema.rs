//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! Values are validated by [`crate::config::validation`] before a
//! [`ProxyConfig`] is built from the command line.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use url::Url;

/// Default port to listen on.
pub const DEFAULT_PORT: u16 = 8888;

/// Default grace interval for shutdown, in seconds.
pub const DEFAULT_GRACE_SECS: u64 = 10;

/// Root configuration for the forwarding proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream origin every request is forwarded to.
    pub upstream: Url,

    /// Listener configuration (bind address, port, limits).
    pub listener: ListenerConfig,

    /// How long in-flight requests may run once shutdown starts.
    pub grace: Duration,

    /// Upstream connection pool settings.
    pub pool: PoolConfig,
}

impl ProxyConfig {
    /// Build a configuration for `upstream` with every other value defaulted.
    pub fn new(upstream: Url) -> Self {
        Self {
            upstream,
            listener: ListenerConfig::default(),
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            pool: PoolConfig::default(),
        }
    }

    /// Upstream TCP connect timeout: half the grace period.
    ///
    /// Connection setup has to fail well before a drain deadline.
    pub fn connect_timeout(&self) -> Duration {
        self.grace / 2
    }

    /// Upstream TLS handshake timeout: half the grace period.
    pub fn tls_handshake_timeout(&self) -> Duration {
        self.grace / 2
    }

    /// How long a pooled upstream connection may sit idle.
    pub fn idle_timeout(&self) -> Duration {
        self.grace * 3
    }

    /// TCP keepalive probe interval for upstream sockets.
    pub fn keepalive_interval(&self) -> Duration {
        self.grace * 3
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Interface to bind (defaults to all IPv4 interfaces).
    pub bind_address: IpAddr,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_connections: 10_000,
        }
    }
}

/// Upstream connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle upstream connections kept open for reuse.
    pub max_idle_connections: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_connections: 100,
        }
    }
}
