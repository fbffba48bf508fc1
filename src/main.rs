//! mDNS publisher daemon entry point.
//!
//! Watches Docker for containers carrying the configured hostname label and
//! keeps one multicast DNS advertisement per hostname alive while such a
//! container runs.

use std::sync::Arc;

use log::{error, info};
use tokio_util::sync::CancellationToken;

mod config;
mod error;
mod host;
mod publisher;
mod reconciler;
mod runtime;
mod shutdown;
mod status;
mod supervisor;
mod types;

#[cfg(test)]
mod testing;

use config::Config;
use publisher::{MdnsPublisher, Publisher};
use reconciler::Reconciler;
use runtime::DockerRuntime;
use shutdown::{shutdown_signal, ShutdownCoordinator};
use status::{run_status_server, StatusState};
use supervisor::{Supervisor, SupervisorSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let cfg = Config::load()?;

    // Initialize logging; RUST_LOG still takes precedence
    let log_env = env_logger::Env::default().default_filter_or(cfg.log_level.as_str());
    env_logger::Builder::from_env(log_env).init();
    info!("Starting mDNS publisher with config: {:?}", cfg);

    let host_ip = host::resolve_host_ip(cfg.host_ip);
    info!("Host IP: {}", host_ip);

    // Without the protocol engine there is nothing useful to do.
    let publisher: Arc<dyn Publisher> = match MdnsPublisher::new() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&publisher),
        cfg.template(),
        cfg.resync_policy,
    ));
    let cancel = CancellationToken::new();

    // Connection Supervisor (Docker)
    let supervisor = Supervisor::new(
        DockerRuntime::new(),
        Arc::clone(&reconciler),
        SupervisorSettings {
            label_host: cfg.label_host.clone(),
            host_ip,
            retry_delay: cfg.retry_delay(),
            event_buffer: cfg.event_buffer,
        },
    );
    let status_state = StatusState {
        reconciler: Arc::clone(&reconciler),
        connection: supervisor.state(),
    };
    let supervisor_cancel = cancel.clone();
    let mut supervisor_handle =
        tokio::spawn(async move { supervisor.run(supervisor_cancel).await });

    // Status Server
    let status_bind = cfg.health_bind();
    let status_cancel = cancel.clone();
    let status_handle = tokio::spawn(async move {
        if let Err(e) = run_status_server(status_bind, status_state, status_cancel).await {
            error!("Health server failed: {}", e);
        }
    });

    let coordinator = ShutdownCoordinator::new(cancel, reconciler, publisher);

    // Graceful Shutdown
    let supervisor_exited = tokio::select! {
        () = shutdown_signal() => false,
        result = &mut supervisor_handle => {
            if let Err(e) = result {
                error!("Connection supervisor failed: {}", e);
            }
            true
        }
    };
    if !supervisor_exited {
        coordinator.attach_supervisor(supervisor_handle).await;
    }

    coordinator.shutdown().await;
    if let Err(e) = status_handle.await {
        error!("Health server task failed: {}", e);
    }

    info!("Shutdown complete.");
    Ok(())
}
