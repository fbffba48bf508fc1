use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RuntimeError;
use crate::types::{ContainerEvent, ContainerInfo};

pub mod docker;
pub use docker::DockerRuntime;

/// Entry point to a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    type Session: RuntimeSession;

    /// Establishes a connection.  Any error is a transport failure.
    async fn connect(&self) -> Result<Self::Session, RuntimeError>;
}

/// A live connection to the container runtime.
#[async_trait]
pub trait RuntimeSession: Send + Sync {
    /// Currently running containers with their labels.
    async fn running_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError>;

    /// Current labels of a container, or `None` if it no longer exists.
    async fn container_labels(
        &self,
        container_id: &str,
    ) -> Result<Option<HashMap<String, String>>, RuntimeError>;

    /// Starts streaming container events into a bounded channel.
    fn subscribe(&self, capacity: usize) -> Subscription;
}

/// Receiving end of an event stream fed by a background task.
///
/// The channel closes when the stream ends; an `Err` item means the stream
/// failed.  Dropping the subscription aborts the feeding task.
pub struct Subscription {
    rx: mpsc::Receiver<Result<ContainerEvent, RuntimeError>>,
    pump: JoinHandle<()>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::Receiver<Result<ContainerEvent, RuntimeError>>,
        pump: JoinHandle<()>,
    ) -> Self {
        Self { rx, pump }
    }

    pub async fn recv(&mut self) -> Option<Result<ContainerEvent, RuntimeError>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
