//! Orderly shutdown: stop the supervisor, withdraw everything, close the
//! publisher.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::publisher::Publisher;
use crate::reconciler::Reconciler;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub withdrawn: usize,
    pub publisher_closed: bool,
}

pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    reconciler: Arc<Reconciler>,
    publisher: Arc<dyn Publisher>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    pub fn new(
        cancel: CancellationToken,
        reconciler: Arc<Reconciler>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            cancel,
            reconciler,
            publisher,
            supervisor: Mutex::new(None),
        }
    }

    /// Hands over the supervisor task so shutdown can wait for it to drain.
    pub async fn attach_supervisor(&self, handle: JoinHandle<()>) {
        *self.supervisor.lock().await = Some(handle);
    }

    /// Runs the shutdown sequence.  Every step is idempotent, so a second
    /// run withdraws nothing and leaves the closed publisher alone.
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Cleaning up...");

        self.cancel.cancel();
        if let Some(handle) = self.supervisor.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Connection supervisor ended abnormally: {}", e);
            }
        }

        let withdrawn = self.reconciler.withdraw_all().await;
        let remaining = self.reconciler.len().await;
        if remaining > 0 {
            warn!("{} advertisements could not be withdrawn", remaining);
        }

        let mut publisher_closed = false;
        if !self.publisher.is_closed() {
            match self.publisher.close() {
                Ok(()) => publisher_closed = true,
                Err(e) => error!("Failed to close mDNS publisher: {}", e),
            }
        }

        info!("Cleanup complete: {} advertisements withdrawn", withdrawn);
        ShutdownReport {
            withdrawn,
            publisher_closed,
        }
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C, shutting down..."); }
        () = terminate => { info!("Received SIGTERM, shutting down..."); }
    }
}
