//! Data structures used throughout the publisher daemon.
//!
//! An [`Advertisement`] is the unit of multicast state: one per advertised
//! hostname.  Container runtime events are normalised into
//! [`ContainerEvent`] and [`ContainerInfo`] so the reconciliation logic
//! never sees runtime-specific types.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// Domain suffix used by multicast DNS.
pub const LOCAL_SUFFIX: &str = ".local";

/// Strips a trailing `.local` from a hostname to get the short name used as
/// the service instance name.  Hostnames without the suffix are returned
/// unchanged.
pub fn derive_name(hostname: &str) -> &str {
    hostname.strip_suffix(LOCAL_SUFFIX).unwrap_or(hostname)
}

/// Fully qualified server name for a hostname, always ending in `.local.`.
pub fn server_name(hostname: &str) -> String {
    format!("{}{}.", derive_name(hostname), LOCAL_SUFFIX)
}

/// Settings shared by every advertisement the daemon creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementTemplate {
    pub service_type: String,
    pub port: u16,
}

/// A single advertised hostname.
///
/// Immutable once built; changing the address of a hostname requires an
/// unregister followed by a fresh register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Raw hostname as found in the container label, e.g. `foo.local`.
    pub hostname: String,
    /// Hostname with the `.local` suffix stripped, e.g. `foo`.
    pub local_name: String,
    /// Host address every record resolves to.
    pub ip: IpAddr,
    /// Port carried in the service record.
    pub port: u16,
    /// Service type, e.g. `_minecraft._tcp.local.`.
    pub service_type: String,
    /// Full service instance name, e.g. `foo._minecraft._tcp.local.`.
    pub service_name: String,
}

impl Advertisement {
    pub fn new(hostname: &str, ip: IpAddr, template: &AdvertisementTemplate) -> Self {
        let local_name = derive_name(hostname).to_string();
        let service_name = format!("{}.{}", local_name, template.service_type);
        Self {
            hostname: hostname.to_string(),
            local_name,
            ip,
            port: template.port,
            service_type: template.service_type.clone(),
            service_name,
        }
    }

    /// Server (host) name carried in the record, `<local_name>.local.`.
    pub fn server_name(&self) -> String {
        server_name(&self.hostname)
    }
}

/// State of the connection to the container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Lifecycle action carried by a container event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Die,
    /// Any other action; ignored by the reconciler.
    Other(String),
}

impl From<&str> for ContainerAction {
    fn from(action: &str) -> Self {
        match action {
            "start" => ContainerAction::Start,
            "die" => ContainerAction::Die,
            other => ContainerAction::Other(other.to_string()),
        }
    }
}

/// A container lifecycle event.
///
/// `attributes` is the snapshot captured when the event was emitted.  It is
/// the only label source for `die`, since the container may already be
/// gone by the time the event is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub action: ContainerAction,
    pub container_id: String,
    pub attributes: HashMap<String, String>,
}

/// One entry of the running-container inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: Option<String>,
    pub running: bool,
    pub labels: HashMap<String, String>,
}
