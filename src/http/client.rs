//! Pooled upstream HTTP client.
//!
//! # Responsibilities
//! - Dial http and https upstreams (TLS is passed through to the origin)
//! - Bound TCP connect and TLS handshake time
//! - Reach the upstream through an egress proxy when the environment names one
//! - Keep a capped number of idle connections for reuse
//!
//! Every timeout is derived from the grace period, see [`ProxyConfig`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::Uri;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use thiserror::Error;
use tower::Service;

use crate::config::ProxyConfig;
use crate::http::egress::{EgressConnector, EgressProxy};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connector used for upstream connections.
pub type UpstreamConnector = TimeoutConnector<HttpsConnector<EgressConnector>>;

/// Client shared by every proxied request.
pub type UpstreamClient = Client<UpstreamConnector, Body>;

/// Build the upstream client for `config`, dialing through `egress` where it applies.
pub fn build_client(config: &ProxyConfig, egress: EgressProxy) -> UpstreamClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(Some(config.connect_timeout()));
    http.set_keepalive(Some(config.keepalive_interval()));

    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(EgressConnector::new(http, egress));

    let connector = TimeoutConnector::new(
        https,
        config.connect_timeout(),
        config.tls_handshake_timeout(),
    );

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(config.idle_timeout())
        .pool_max_idle_per_host(config.pool.max_idle_connections)
        .pool_timer(TokioTimer::new())
        .build(connector)
}

/// Establishing an upstream connection took too long.
#[derive(Debug, Error)]
#[error("upstream connection not established within {0:?}")]
pub struct ConnectTimeout(pub Duration);

/// Caps the total time spent establishing a connection.
///
/// Plain http gets the connect timeout; https additionally gets the
/// handshake timeout on top.
#[derive(Debug, Clone)]
pub struct TimeoutConnector<C> {
    inner: C,
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl<C> TimeoutConnector<C> {
    pub fn new(inner: C, connect_timeout: Duration, handshake_timeout: Duration) -> Self {
        Self {
            inner,
            connect_timeout,
            handshake_timeout,
        }
    }

    fn budget(&self, uri: &Uri) -> Duration {
        if uri.scheme() == Some(&Scheme::HTTPS) {
            self.connect_timeout + self.handshake_timeout
        } else {
            self.connect_timeout
        }
    }
}

impl<C> Service<Uri> for TimeoutConnector<C>
where
    C: Service<Uri>,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let budget = self.budget(&uri);
        let connecting = self.inner.call(uri);
        Box::pin(async move {
            match tokio::time::timeout(budget, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(ConnectTimeout(budget).into()),
            }
        })
    }
}
