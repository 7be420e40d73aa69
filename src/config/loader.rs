//! Configuration loading from the command line and environment.

use std::net::IpAddr;

use clap::Parser;
use thiserror::Error;

use crate::config::schema::{
    ListenerConfig, PoolConfig, ProxyConfig, DEFAULT_GRACE_SECS, DEFAULT_PORT,
};
use crate::config::validation::{validate_grace, validate_port, validate_upstream, ValidationError};

/// Environment variable holding the upstream URL.
pub const ENV_URL: &str = "TYPEPROXY_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing URL command line parameter or env variable {ENV_URL}")]
    MissingUpstream,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Forward HTTP traffic to a single upstream, tagging JSON POST bodies
/// with their original Content-Type.
#[derive(Debug, Parser)]
#[command(name = "typeproxy", version, about)]
pub struct Cli {
    /// URL to forward traffic to
    #[arg(value_name = "URL", env = ENV_URL)]
    pub url: Option<String>,

    /// TCP port to listen to
    #[arg(long, env = "TYPEPROXY_PORT", default_value_t = i64::from(DEFAULT_PORT), allow_negative_numbers = true)]
    pub port: i64,

    /// Grace interval for shutdown (seconds)
    #[arg(long, env = "TYPEPROXY_GRACE", default_value_t = DEFAULT_GRACE_SECS as i64, allow_negative_numbers = true)]
    pub grace: i64,

    /// Interface address to bind
    #[arg(long, env = "TYPEPROXY_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Maximum concurrent client connections
    #[arg(long, env = "TYPEPROXY_MAX_CONNECTIONS", default_value_t = ListenerConfig::default().max_connections)]
    pub max_connections: usize,

    /// Idle upstream connections kept for reuse
    #[arg(long, env = "TYPEPROXY_MAX_IDLE_CONNECTIONS", default_value_t = PoolConfig::default().max_idle_connections)]
    pub max_idle_connections: usize,
}

impl TryFrom<Cli> for ProxyConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let port = validate_port(cli.port)?;
        let grace = validate_grace(cli.grace)?;

        let raw_url = cli
            .url
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingUpstream)?;
        let upstream = validate_upstream(&raw_url)?;

        Ok(ProxyConfig {
            upstream,
            listener: ListenerConfig {
                bind_address: cli.host,
                port,
                max_connections: cli.max_connections,
            },
            grace,
            pool: PoolConfig {
                max_idle_connections: cli.max_idle_connections,
            },
        })
    }
}
