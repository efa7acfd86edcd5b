//! Graceful shutdown on SIGTERM and SIGINT.
//!
//! A background task listens for either signal and fires a shared
//! [`CancellationToken`], which drains the axum server and stops the expiry
//! sweeper.

use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub struct Shutdown {
    _tracker: TaskTracker,
    token: CancellationToken,
}

impl Shutdown {
    /// Registers the signal handlers.
    ///
    /// Returns an error if signal registration fails.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let inner = token.clone();
        let tracker = TaskTracker::new();
        tracker.spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
            inner.cancel();
        });
        tracker.close();
        Ok(Self {
            _tracker: tracker,
            token,
        })
    }

    /// A clone of the cancellation token for distributing to subsystems.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
