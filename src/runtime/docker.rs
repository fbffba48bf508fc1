use super::{ContainerRuntime, RuntimeSession, Subscription};
use crate::error::RuntimeError;
use crate::types::{ContainerAction, ContainerEvent, ContainerInfo};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::errors::Error as DockerError;
use bollard::models::EventMessage;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Container runtime backed by the local Docker daemon.
#[derive(Default)]
pub struct DockerRuntime;

impl DockerRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    type Session = DockerSession;

    async fn connect(&self) -> Result<DockerSession, RuntimeError> {
        // Connect to the local Docker daemon using default settings.
        // This handles unix socket on Linux.
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Connect(e.to_string()))?;
        // The client is lazy; ping so a missing daemon is noticed here.
        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        info!("Connected to Docker daemon");
        Ok(DockerSession { docker })
    }
}

pub struct DockerSession {
    docker: Docker,
}

#[async_trait]
impl RuntimeSession for DockerSession {
    async fn running_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string());
                Some(ContainerInfo {
                    id,
                    name,
                    running: c.state.as_deref().map_or(true, |s| s == "running"),
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn container_labels(
        &self,
        container_id: &str,
    ) -> Result<Option<HashMap<String, String>>, RuntimeError> {
        match self.docker.inspect_container(container_id, None).await {
            Ok(detail) => Ok(Some(
                detail.config.and_then(|c| c.labels).unwrap_or_default(),
            )),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity);
        let docker = self.docker.clone();
        let pump = tokio::spawn(async move {
            let opts = EventsOptions::<String> {
                filters: [
                    ("type", ["container"].as_slice()),
                    ("event", ["start", "die"].as_slice()),
                ]
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect(),
                ..Default::default()
            };

            let mut stream = docker.events(Some(opts));
            info!("Listening for Docker events...");
            while let Some(msg) = stream.next().await {
                let item = match msg {
                    Ok(event) => match to_container_event(event) {
                        Some(event) => Ok(event),
                        None => continue,
                    },
                    Err(e) => {
                        error!("Error in Docker event stream: {}", e);
                        Err(RuntimeError::Transport(e.to_string()))
                    }
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("Event subscriber gone, stopping pump");
                    return;
                }
                if failed {
                    return;
                }
            }
            warn!("Docker event stream ended");
        });
        Subscription::new(rx, pump)
    }
}

fn to_container_event(event: EventMessage) -> Option<ContainerEvent> {
    let actor = event.actor?;
    let container_id = actor.id.unwrap_or_default();
    if container_id.is_empty() {
        return None;
    }
    let action = event.action.unwrap_or_default();
    Some(ContainerEvent {
        action: ContainerAction::from(action.as_str()),
        container_id,
        attributes: actor.attributes.unwrap_or_default(),
    })
}
