//! Shutdown coordination for the proxy.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::signals::TerminationSignal;

/// Where the process is in its shutdown sequence.
///
/// Only ever moves forward: `Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    /// Accepting and serving connections.
    Running,
    /// No longer accepting; in-flight requests finishing within the grace period.
    Draining,
    /// Every connection is closed.
    Stopped,
}

/// What asked for the drain to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM.
    Signal(TerminationSignal),
    /// The accept loop ended on its own.
    ListenerExited,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "{signal}"),
            ShutdownReason::ListenerExited => f.write_str("listener exited"),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Any number of producers may call [`Shutdown::trigger`]; only the first
/// call moves the state to `Draining`. Clones share the same state.
#[derive(Clone)]
pub struct Shutdown {
    state: Arc<watch::Sender<ShutdownState>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator in the `Running` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownState::Running);
        Self { state: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Request the `Running → Draining` transition.
    ///
    /// Returns `true` for the single call that performed the transition.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let won = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });

        if won {
            tracing::info!(%reason, "Shutdown triggered");
        } else {
            tracing::debug!(%reason, "Shutdown already in progress");
        }
        won
    }

    /// Mark the drain as finished.
    pub fn mark_stopped(&self) {
        self.state.send_replace(ShutdownState::Stopped);
    }

    /// Resolves once the state has left `Running`.
    pub async fn draining(&self) {
        self.wait_for(ShutdownState::Draining).await;
    }

    /// Resolves once the state is `Stopped`.
    pub async fn stopped(&self) {
        self.wait_for(ShutdownState::Stopped).await;
    }

    async fn wait_for(&self, target: ShutdownState) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state >= target).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn trigger_wins_once() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.state(), ShutdownState::Running);

        assert!(shutdown.trigger(ShutdownReason::Signal(TerminationSignal::Terminate)));
        assert!(!shutdown.trigger(ShutdownReason::ListenerExited));
        assert!(!shutdown.clone().trigger(ShutdownReason::Signal(TerminationSignal::Interrupt)));
        assert_eq!(shutdown.state(), ShutdownState::Draining);
    }

    #[test]
    fn trigger_after_stop_is_ignored() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::ListenerExited);
        shutdown.mark_stopped();

        assert!(!shutdown.trigger(ShutdownReason::ListenerExited));
        assert_eq!(shutdown.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn concurrent_triggers_have_one_winner() {
        let shutdown = Shutdown::new();
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..16 {
            let shutdown = shutdown.clone();
            let winners = winners.clone();
            handles.push(tokio::spawn(async move {
                let reason = if i % 2 == 0 {
                    ShutdownReason::ListenerExited
                } else {
                    ShutdownReason::Signal(TerminationSignal::Interrupt)
                };
                if shutdown.trigger(reason) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiters_observe_transitions() {
        let shutdown = Shutdown::new();

        let draining = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.draining().await }
        });
        let stopped = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.stopped().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!draining.is_finished());

        shutdown.trigger(ShutdownReason::ListenerExited);
        tokio::time::timeout(Duration::from_secs(1), draining)
            .await
            .unwrap()
            .unwrap();
        assert!(!stopped.is_finished());

        shutdown.mark_stopped();
        tokio::time::timeout(Duration::from_secs(1), stopped)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn draining_resolves_immediately_when_already_past() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::ListenerExited);
        shutdown.mark_stopped();

        tokio::time::timeout(Duration::from_millis(100), shutdown.draining())
            .await
            .unwrap();
    }
}
