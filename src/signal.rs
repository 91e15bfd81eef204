//! Signal handling for graceful shutdown.
//!
//! Cancellation is carried by an explicit [`ShutdownToken`] handed to every
//! long-running task. [`spawn_signal_listener`] cancels a token on SIGINT or
//! SIGTERM.

use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

/// A token that can be shared across tasks to check for and await shutdown.
#[derive(Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownToken {
    /// Create a new shutdown token.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Request cancellation on this token and all its clones.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Spawn a task that cancels `token` on SIGINT or SIGTERM.
///
/// If signal handlers cannot be registered (e.g., in restricted environments),
/// a warning is logged and only explicit cancellation stops the process.
pub fn spawn_signal_listener(token: ShutdownToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGINT handler: {}", e);
                None
            }
        };

        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                None
            }
        };

        let name = match (sigint, sigterm) {
            (Some(mut int), Some(mut term)) => {
                tokio::select! {
                    _ = int.recv() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                    _ = token.cancelled() => return,
                }
            }
            (Some(mut int), None) => {
                tokio::select! {
                    _ = int.recv() => "SIGINT",
                    _ = token.cancelled() => return,
                }
            }
            (None, Some(mut term)) => {
                tokio::select! {
                    _ = term.recv() => "SIGTERM",
                    _ = token.cancelled() => return,
                }
            }
            (None, None) => {
                warn!("No signal handlers registered - graceful shutdown disabled");
                return;
            }
        };

        info!("Received {}, initiating graceful shutdown...", name);
        token.cancel();
    })
}
