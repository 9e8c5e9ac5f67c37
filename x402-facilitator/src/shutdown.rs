//! Graceful shutdown signal handling.
//!
//! [`SigDown`] listens for OS shutdown signals (SIGTERM/SIGINT on Unix,
//! Ctrl-C on Windows) and triggers a [`CancellationToken`] that can be
//! handed to `axum::serve(...).with_graceful_shutdown(...)` or any other
//! subsystem that needs to know when to stop.

#[cfg(unix)]
use tokio::signal::unix::SignalKind;
#[cfg(unix)]
use tokio::signal::unix::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Handles graceful shutdown on SIGTERM/SIGINT (Ctrl-C on Windows).
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Spawns the background signal-listener task.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn try_new() -> Result<Self, std::io::Error> {
        let inner = CancellationToken::new();
        let outer = inner.clone();
        let task_tracker = TaskTracker::new();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            task_tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("received SIGTERM, shutting down...");
                        inner.cancel();
                    },
                    _ = sigint.recv() => {
                        tracing::info!("received SIGINT, shutting down...");
                        inner.cancel();
                    }
                }
            });
        }

        #[cfg(windows)]
        {
            task_tracker.spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("received Ctrl-C, shutting down...");
                inner.cancel();
            });
        }

        task_tracker.close();
        Ok(Self { task_tracker, cancellation_token: outer })
    }

    /// Returns a clone of the cancellation token for distributing to subsystems.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Waits for a shutdown signal, then waits for the signal handler task
    /// itself to finish.
    #[allow(dead_code)]
    pub async fn recv(&self) {
        self.cancellation_token.cancelled().await;
        self.task_tracker.wait().await;
    }
}
