//! Shutdown signalling for the drive loop and the listener.
//!
//! SIGINT/SIGTERM (or a programmatic trigger) flips a `watch` flag. The drive
//! loop checks it between cycles, so a cycle in progress always completes.

use std::future::Future;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owns the shutdown flag.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Cloneable view of the shutdown flag.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::warn!("failed to listen for SIGINT: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!("failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
        }

        self.shutdown();
    }

    /// Wait until `stop` resolves or the drive task ends on its own.
    ///
    /// Either way shutdown is triggered and the drive task is awaited, so
    /// the cycle it is running finishes before this returns.
    pub async fn supervise<F>(&self, stop: F, mut drive: JoinHandle<()>)
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = stop => {
                self.shutdown();
                drive.await
            }
            result = &mut drive => result,
        };
        self.shutdown();
        if let Err(e) = result {
            tracing::error!("drive loop failed: {e}");
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn triggered(mut self) {
        // An Err means the controller is gone and nothing can trigger us.
        let triggered = self.rx.wait_for(|&stop| stop).await.is_ok();
        if !triggered {
            std::future::pending::<()>().await;
        }
    }
}
