//! Outbound proxy selection for upstream connections.
//!
//! # Responsibilities
//! - Read `HTTP_PROXY`, `HTTPS_PROXY`, `ALL_PROXY` and `NO_PROXY` once at startup
//! - Send plain http upstream requests to the egress proxy in absolute form
//! - Tunnel https upstreams through the egress proxy with CONNECT
//!
//! # Design Decisions
//! - Loopback destinations are always dialed directly
//! - Basic credentials in the proxy URL go out as `Proxy-Authorization`

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::uri::Scheme;
use axum::http::{HeaderValue, Uri};
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::proxy::matcher::{Intercept, Matcher};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower::{Service, ServiceExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Egress proxy rules shared by the connector and the request handler.
#[derive(Clone)]
pub struct EgressProxy {
    matcher: Arc<Matcher>,
}

impl EgressProxy {
    /// Rules taken from the process environment.
    pub fn from_env() -> Self {
        Self::new(Matcher::from_env())
    }

    pub fn new(matcher: Matcher) -> Self {
        Self {
            matcher: Arc::new(matcher),
        }
    }

    /// The proxy `dst` should be reached through, if any.
    pub fn intercept(&self, dst: &Uri) -> Option<Intercept> {
        if dst.host().is_some_and(is_loopback) {
            return None;
        }
        self.matcher.intercept(dst)
    }

    /// Credentials to attach to a plain http request sent through a proxy.
    ///
    /// Tunnelled requests carry them on the CONNECT instead.
    pub fn authorization(&self, dst: &Uri) -> Option<HeaderValue> {
        if dst.scheme() != Some(&Scheme::HTTP) {
            return None;
        }
        self.intercept(dst)?.basic_auth().cloned()
    }
}

fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// TCP connector that honours [`EgressProxy`] rules.
#[derive(Clone)]
pub struct EgressConnector {
    http: HttpConnector,
    proxy: EgressProxy,
}

impl EgressConnector {
    pub fn new(http: HttpConnector, proxy: EgressProxy) -> Self {
        Self { http, proxy }
    }
}

impl Service<Uri> for EgressConnector {
    type Response = EgressStream<TokioIo<TcpStream>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let http = self.http.clone();
        let intercept = self.proxy.intercept(&dst);

        Box::pin(async move {
            let Some(intercept) = intercept else {
                let stream = http.oneshot(dst).await?;
                return Ok(EgressStream::direct(stream));
            };

            tracing::debug!(
                upstream = %dst,
                proxy = %intercept.uri(),
                "Connecting through egress proxy"
            );

            if dst.scheme() == Some(&Scheme::HTTPS) {
                let mut tunnel = Tunnel::new(intercept.uri().clone(), http);
                if let Some(auth) = intercept.basic_auth() {
                    tunnel = tunnel.with_auth(auth.clone());
                }
                let stream = tunnel.oneshot(dst).await?;
                Ok(EgressStream::direct(stream))
            } else {
                let stream = http.oneshot(intercept.uri().clone()).await?;
                Ok(EgressStream::proxied(stream))
            }
        })
    }
}

/// Connection that remembers whether it ends at an http proxy.
///
/// Requests over a proxied connection keep their absolute-form URI.
#[derive(Debug)]
pub struct EgressStream<T> {
    inner: T,
    proxied: bool,
}

impl<T> EgressStream<T> {
    fn direct(inner: T) -> Self {
        Self {
            inner,
            proxied: false,
        }
    }

    fn proxied(inner: T) -> Self {
        Self {
            inner,
            proxied: true,
        }
    }
}

impl<T: Connection> Connection for EgressStream<T> {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.proxied)
    }
}

impl<T: Read + Unpin> Read for EgressStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<T: Write + Unpin> Write for EgressStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }
}
