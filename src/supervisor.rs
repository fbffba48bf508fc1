//! Connection supervisor.
//!
//! Drives the connection to the container runtime through
//! `Disconnected -> Connecting -> Connected -> Disconnected -> ...` and feeds
//! the reconciler.  On every (re)connect a full inventory resync runs before
//! any streamed event is applied.  Transport failures are logged and retried
//! after a fixed delay, forever, until the cancellation token fires.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::reconciler::Reconciler;
use crate::runtime::{ContainerRuntime, RuntimeSession};
use crate::types::{ContainerAction, ContainerEvent, ContainerInfo, ConnectionState};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Label key whose value is the hostname to advertise.
    pub label_host: String,
    pub host_ip: IpAddr,
    pub retry_delay: Duration,
    pub event_buffer: usize,
}

pub struct Supervisor<R: ContainerRuntime> {
    runtime: R,
    reconciler: Arc<Reconciler>,
    settings: SupervisorSettings,
    state: watch::Sender<ConnectionState>,
}

impl<R: ContainerRuntime> Supervisor<R> {
    pub fn new(runtime: R, reconciler: Arc<Reconciler>, settings: SupervisorSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            runtime,
            reconciler,
            settings,
            state,
        }
    }

    /// Observes connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection state: {} -> {}", previous, state);
        }
    }

    /// Runs until `cancel` fires.  Cancellation is checked between events
    /// and at the top of every retry cycle.
    pub async fn run(&self, cancel: CancellationToken) {
        let retry_secs = self.settings.retry_delay.as_secs_f32();
        while !cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                connected = self.runtime.connect() => connected,
            };

            match connected {
                Ok(session) => {
                    self.set_state(ConnectionState::Connected);
                    if let Err(e) = self.serve(&session, &cancel).await {
                        error!("Docker event listener error: {}. Retrying in {}s...", e, retry_secs);
                    }
                }
                Err(e) => {
                    error!("Failed to connect to Docker: {}. Retrying in {}s...", e, retry_secs);
                }
            }
            self.set_state(ConnectionState::Disconnected);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.settings.retry_delay) => {}
            }
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Connection supervisor stopped");
    }

    /// Handles one connection.  Returns `Ok` only when cancelled.
    async fn serve(&self, session: &R::Session, cancel: &CancellationToken) -> Result<(), RuntimeError> {
        // Subscribe first so nothing emitted during the scan is lost; the
        // buffered events are applied after the resync.
        let mut subscription = session.subscribe(self.settings.event_buffer);
        self.resync(session).await?;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = subscription.recv() => next,
            };
            match next {
                Some(Ok(event)) => self.handle_event(session, event).await,
                Some(Err(e)) => return Err(e),
                None => return Err(RuntimeError::Transport("event stream ended".into())),
            }
        }
    }

    /// Registers every labeled, running container that is not advertised yet.
    async fn resync(&self, session: &R::Session) -> Result<(), RuntimeError> {
        let containers = session.running_containers().await?;
        let hostnames = labeled_hostnames(&containers, &self.settings.label_host);
        info!(
            "Inventory scan found {} labeled containers of {} running",
            hostnames.len(),
            containers.len()
        );
        self.reconciler
            .resync(&hostnames, self.settings.host_ip)
            .await;
        Ok(())
    }

    /// Applies a single lifecycle event.  Failures stay contained here.
    pub async fn handle_event(&self, session: &R::Session, event: ContainerEvent) {
        let label = self.settings.label_host.as_str();
        match event.action {
            ContainerAction::Start => match session.container_labels(&event.container_id).await {
                Ok(Some(labels)) => {
                    if let Some(hostname) = labels.get(label).filter(|h| !h.is_empty()) {
                        info!(
                            "Container {} started with hostname {}",
                            event.container_id, hostname
                        );
                        self.reconciler
                            .register(hostname, self.settings.host_ip)
                            .await;
                    }
                }
                Ok(None) => {
                    debug!(
                        "Container {} not found (probably already removed)",
                        event.container_id
                    );
                }
                Err(e) => {
                    error!("Error handling container event: {}", e);
                }
            },
            ContainerAction::Die => {
                if let Some(hostname) = event.attributes.get(label).filter(|h| !h.is_empty()) {
                    info!(
                        "Container {} died with hostname {}",
                        event.container_id, hostname
                    );
                    self.reconciler.unregister(hostname).await;
                }
            }
            ContainerAction::Other(action) => {
                debug!("Ignoring {} event for {}", action, event.container_id);
            }
        }
    }
}

/// Hostnames claimed by running containers through `label`.
pub fn labeled_hostnames(containers: &[ContainerInfo], label: &str) -> BTreeSet<String> {
    containers
        .iter()
        .filter(|c| c.running)
        .filter_map(|c| {
            let hostname = c.labels.get(label).filter(|h| !h.is_empty())?;
            debug!(
                "Found existing container {} with hostname {}",
                c.name.as_deref().unwrap_or(&c.id),
                hostname
            );
            Some(hostname.clone())
        })
        .collect()
}
