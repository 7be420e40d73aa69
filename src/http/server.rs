//! HTTP server setup and connection lifecycle.
//!
//! # Responsibilities
//! - Create the Axum router wrapping the proxy handler
//! - Serve HTTP/1.1 and HTTP/2 connections from the listener
//! - Forward every request upstream through the director
//! - Drain connections within the grace period on shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::PROXY_AUTHORIZATION, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use thiserror::Error;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::client::{build_client, UpstreamClient};
use crate::http::director::{Director, DirectorError};
use crate::http::egress::EgressProxy;
use crate::http::{request, response};
use crate::lifecycle::{Shutdown, ShutdownReason};
use crate::net::{ConnectionTracker, Listener, ListenerError};

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Errors from building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Director(#[from] DirectorError),

    #[error("accept loop failed: {0}")]
    Accept(#[from] ListenerError),

    #[error("listener address unavailable: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub director: Arc<Director>,
    pub client: UpstreamClient,
    pub egress: EgressProxy,
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let egress = EgressProxy::from_env();
        let state = AppState {
            director: Arc::new(Director::new(&config.upstream)?),
            client: build_client(&config, egress.clone()),
            egress,
        };

        let router = Self::build_router(state);
        Ok(Self { router, config })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve connections from `listener` until `shutdown` starts draining,
    /// then drain. Returns once every connection is closed.
    ///
    /// If the accept loop fails on its own it triggers the shutdown itself,
    /// drains the same way and reports the failure.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream,
            grace = ?self.config.grace,
            "Forwarding requests"
        );

        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();
        let mut backoff = ACCEPT_BACKOFF_MIN;
        let mut outcome = Ok(());

        let draining = shutdown.draining();
        tokio::pin!(draining);

        loop {
            tokio::select! {
                _ = &mut draining => break,

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        backoff = ACCEPT_BACKOFF_MIN;
                        let guard = tracker.track();
                        let router = self.router.clone();
                        let service = service_fn(move |mut request: Request<Incoming>| {
                            request.extensions_mut().insert(ConnectInfo(peer));
                            router.clone().oneshot(request)
                        });

                        let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                        let conn = graceful.watch(conn.into_owned());
                        connections.spawn(async move {
                            let _permit = permit;
                            if let Err(e) = conn.await {
                                tracing::debug!(
                                    connection_id = %guard.id(),
                                    peer_addr = %peer,
                                    error = %e,
                                    "Connection ended with error"
                                );
                            }
                            drop(guard);
                        });
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!(error = %e, retry_in = ?backoff, "Accept failed, retrying");
                        if !pause_accepting(backoff, &mut draining).await {
                            break;
                        }
                        backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Accept loop exited");
                        shutdown.trigger(ShutdownReason::ListenerExited);
                        outcome = Err(e.into());
                        break;
                    }
                }
            }
        }

        // Stop accepting before the drain starts.
        drop(listener);
        self.drain(graceful, connections, &tracker).await;
        shutdown.mark_stopped();

        tracing::info!("HTTP server stopped");
        outcome
    }

    async fn drain(
        &self,
        graceful: GracefulShutdown,
        mut connections: JoinSet<()>,
        tracker: &ConnectionTracker,
    ) {
        let grace = self.config.grace;
        tracing::info!(
            grace = ?grace,
            open_connections = tracker.open_connections(),
            "Cancelling server, waiting up to the grace period"
        );

        match tokio::time::timeout(grace, graceful.shutdown()).await {
            Ok(()) => tracing::info!("All connections drained"),
            Err(_) => tracing::warn!(
                open_connections = tracker.open_connections(),
                "Grace period elapsed, closing remaining connections"
            ),
        }

        connections.abort_all();
        while let Some(result) = connections.join_next().await {
            match result {
                Ok(()) => {}
                // Connections cut at the deadline; expected, never an error.
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::debug!(error = %e, "Connection task failed during shutdown"),
            }
        }
    }
}

/// Wait out an accept backoff. Returns `false` if draining started meanwhile.
async fn pause_accepting<D>(delay: Duration, draining: &mut D) -> bool
where
    D: Future<Output = ()> + Unpin,
{
    tokio::select! {
        _ = draining => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Main proxy handler.
/// Rewrites the request, forwards it upstream and streams the response back.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let mut request = match state.director.direct(request).await {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot map request onto upstream");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    request::prepare_upstream(&mut request, peer);
    if let Some(auth) = state.egress.authorization(request.uri()) {
        request.headers_mut().insert(PROXY_AUTHORIZATION, auth);
    }

    match state.client.request(request).await {
        Ok(upstream) => response::from_upstream(upstream),
        Err(e) => {
            tracing::error!(error = ?e, "Upstream request failed");
            response::bad_gateway()
        }
    }
}
