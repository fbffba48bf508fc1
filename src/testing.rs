//! In-memory stand-ins for the mDNS engine and the container runtime.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{PublisherError, RuntimeError};
use crate::publisher::Publisher;
use crate::runtime::{ContainerRuntime, RuntimeSession, Subscription};
use crate::types::{
    Advertisement, AdvertisementTemplate, ContainerAction, ContainerEvent, ContainerInfo,
};

pub const LABEL: &str = "mc-router.host";

pub fn template() -> AdvertisementTemplate {
    AdvertisementTemplate {
        service_type: "_minecraft._tcp.local.".into(),
        port: 25565,
    }
}

fn labels(hostname: Option<&str>) -> HashMap<String, String> {
    hostname
        .map(|h| HashMap::from([(LABEL.to_string(), h.to_string())]))
        .unwrap_or_default()
}

pub fn container(id: &str, hostname: Option<&str>) -> ContainerInfo {
    ContainerInfo {
        id: id.into(),
        name: Some(format!("{id}-name")),
        running: true,
        labels: labels(hostname),
    }
}

pub fn start(id: &str) -> ContainerEvent {
    ContainerEvent {
        action: ContainerAction::Start,
        container_id: id.into(),
        attributes: HashMap::new(),
    }
}

pub fn die(id: &str, hostname: Option<&str>) -> ContainerEvent {
    ContainerEvent {
        action: ContainerAction::Die,
        container_id: id.into(),
        attributes: labels(hostname),
    }
}

/// Publisher that records every call and can be told to reject hostnames.
#[derive(Default)]
pub struct RecordingPublisher {
    announced: Mutex<Vec<Advertisement>>,
    withdrawn: Mutex<Vec<String>>,
    reject_announce: Mutex<HashSet<String>>,
    reject_withdraw: Mutex<HashSet<String>>,
    closes: AtomicUsize,
    closed: AtomicBool,
}

impl RecordingPublisher {
    pub fn reject_announce(&self, hostname: &str) {
        self.reject_announce.lock().unwrap().insert(hostname.into());
    }

    pub fn reject_withdraw(&self, hostname: &str) {
        self.reject_withdraw.lock().unwrap().insert(hostname.into());
    }

    pub fn announced(&self) -> Vec<String> {
        self.announced
            .lock()
            .unwrap()
            .iter()
            .map(|ad| ad.hostname.clone())
            .collect()
    }

    pub fn announced_ip(&self, hostname: &str) -> Option<IpAddr> {
        self.announced
            .lock()
            .unwrap()
            .iter()
            .find(|ad| ad.hostname == hostname)
            .map(|ad| ad.ip)
    }

    pub fn withdrawn(&self) -> Vec<String> {
        self.withdrawn.lock().unwrap().clone()
    }

    /// Number of close calls that actually released the engine.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Publisher for RecordingPublisher {
    fn announce(&self, ad: &Advertisement) -> Result<(), PublisherError> {
        if self.is_closed() {
            return Err(PublisherError::Closed);
        }
        if self.reject_announce.lock().unwrap().contains(&ad.hostname) {
            return Err(PublisherError::Announce {
                hostname: ad.hostname.clone(),
                reason: "rejected".into(),
            });
        }
        self.announced.lock().unwrap().push(ad.clone());
        Ok(())
    }

    fn withdraw(&self, ad: &Advertisement) -> Result<(), PublisherError> {
        if self.is_closed() {
            return Err(PublisherError::Closed);
        }
        if self.reject_withdraw.lock().unwrap().contains(&ad.hostname) {
            return Err(PublisherError::Withdraw {
                hostname: ad.hostname.clone(),
                reason: "rejected".into(),
            });
        }
        self.withdrawn.lock().unwrap().push(ad.hostname.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), PublisherError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A connection that replays a fixed inventory, label lookups and events.
///
/// After the last event the stream closes, which the supervisor treats as a
/// lost connection.
#[derive(Default, Clone)]
pub struct ScriptedSession {
    inventory: Vec<ContainerInfo>,
    labels: HashMap<String, HashMap<String, String>>,
    events: Vec<Result<ContainerEvent, String>>,
    inventory_error: Option<String>,
    lookup_errors: HashSet<String>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A running container, also resolvable by label lookup.
    pub fn with_container(mut self, info: ContainerInfo) -> Self {
        self.labels.insert(info.id.clone(), info.labels.clone());
        self.inventory.push(info);
        self
    }

    /// A container known to label lookups only.
    pub fn with_labels(mut self, id: &str, hostname: Option<&str>) -> Self {
        self.labels.insert(id.into(), labels(hostname));
        self
    }

    pub fn with_event(mut self, event: ContainerEvent) -> Self {
        self.events.push(Ok(event));
        self
    }

    /// The inventory scan fails with a transport error.
    pub fn with_inventory_failure(mut self, reason: &str) -> Self {
        self.inventory_error = Some(reason.into());
        self
    }

    /// Label lookups for `id` fail with something other than not-found.
    pub fn with_lookup_error(mut self, id: &str) -> Self {
        self.lookup_errors.insert(id.into());
        self
    }

    pub fn with_failure(mut self, reason: &str) -> Self {
        self.events.push(Err(reason.into()));
        self
    }
}

#[async_trait]
impl RuntimeSession for ScriptedSession {
    async fn running_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        match &self.inventory_error {
            Some(reason) => Err(RuntimeError::Transport(reason.clone())),
            None => Ok(self.inventory.clone()),
        }
    }

    async fn container_labels(
        &self,
        container_id: &str,
    ) -> Result<Option<HashMap<String, String>>, RuntimeError> {
        if self.lookup_errors.contains(container_id) {
            return Err(RuntimeError::Transport(format!(
                "inspect {container_id}: daemon returned 500"
            )));
        }
        Ok(self.labels.get(container_id).cloned())
    }

    fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity);
        let events = self.events.clone();
        let pump = tokio::spawn(async move {
            for event in events {
                let item = event.map_err(RuntimeError::Transport);
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Subscription::new(rx, pump)
    }
}

/// Runtime handing out scripted connections in order.  Once the script is
/// exhausted it cancels `done` and refuses further connections.
pub struct ScriptedRuntime {
    script: Mutex<VecDeque<Result<ScriptedSession, String>>>,
    connects: Arc<AtomicUsize>,
    done: CancellationToken,
}

impl ScriptedRuntime {
    pub fn new(done: CancellationToken) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            connects: Arc::new(AtomicUsize::new(0)),
            done,
        }
    }

    pub fn with_session(self, session: ScriptedSession) -> Self {
        self.script.lock().unwrap().push_back(Ok(session));
        self
    }

    pub fn with_connect_failure(self, reason: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(reason.into()));
        self
    }

    pub fn connects(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    type Session = ScriptedSession;

    async fn connect(&self) -> Result<ScriptedSession, RuntimeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(session)) => Ok(session),
            Some(Err(reason)) => Err(RuntimeError::Connect(reason)),
            None => {
                self.done.cancel();
                Err(RuntimeError::Connect("script exhausted".into()))
            }
        }
    }
}
