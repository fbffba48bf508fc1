//! Advertisement publisher backed by the `mdns-sd` service daemon.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, info, warn};
use mdns_sd::{ServiceDaemon, ServiceInfo};

use super::Publisher;
use crate::error::PublisherError;
use crate::types::Advertisement;

/// Builds the protocol record for an advertisement.
pub fn service_info(ad: &Advertisement) -> Result<ServiceInfo, mdns_sd::Error> {
    let mut properties = HashMap::new();
    properties.insert("server".to_string(), ad.local_name.clone());

    let ip = ad.ip.to_string();
    ServiceInfo::new(
        &ad.service_type,
        &ad.local_name,
        &ad.server_name(),
        ip.as_str(),
        ad.port,
        properties,
    )
}

pub struct MdnsPublisher {
    /// `None` once closed.
    daemon: Mutex<Option<ServiceDaemon>>,
}

impl MdnsPublisher {
    pub fn new() -> Result<Self, PublisherError> {
        let daemon = ServiceDaemon::new().map_err(|e| PublisherError::Init(e.to_string()))?;
        info!("mDNS daemon initialized");
        Ok(Self {
            daemon: Mutex::new(Some(daemon)),
        })
    }

    fn with_daemon<T>(
        &self,
        f: impl FnOnce(&ServiceDaemon) -> Result<T, PublisherError>,
    ) -> Result<T, PublisherError> {
        let guard = self.daemon.lock().map_err(|_| PublisherError::Closed)?;
        match guard.as_ref() {
            Some(daemon) => f(daemon),
            None => Err(PublisherError::Closed),
        }
    }
}

impl Publisher for MdnsPublisher {
    fn announce(&self, ad: &Advertisement) -> Result<(), PublisherError> {
        let rejected = |reason: String| PublisherError::Announce {
            hostname: ad.hostname.clone(),
            reason,
        };
        let info = service_info(ad).map_err(|e| rejected(e.to_string()))?;
        self.with_daemon(|daemon| {
            debug!(
                "Announcing {} (server {}) -> {}:{}",
                ad.service_name,
                ad.server_name(),
                ad.ip,
                ad.port
            );
            // Ok means the daemon queued the record; rejections found later
            // (e.g. name length) only surface through its monitor channel.
            daemon.register(info).map_err(|e| rejected(e.to_string()))
        })
    }

    fn withdraw(&self, ad: &Advertisement) -> Result<(), PublisherError> {
        self.with_daemon(|daemon| {
            debug!("Withdrawing {}", ad.service_name);
            daemon
                .unregister(&ad.service_name)
                .map(|_| ())
                .map_err(|e| PublisherError::Withdraw {
                    hostname: ad.hostname.clone(),
                    reason: e.to_string(),
                })
        })
    }

    fn close(&self) -> Result<(), PublisherError> {
        let mut guard = self.daemon.lock().map_err(|_| PublisherError::Closed)?;
        if let Some(daemon) = guard.take() {
            if let Err(e) = daemon.shutdown() {
                warn!("mDNS daemon shutdown reported an error: {}", e);
            }
            info!("mDNS daemon closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.daemon.lock().map(|d| d.is_none()).unwrap_or(true)
    }
}

impl Drop for MdnsPublisher {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!("mDNS publisher dropped while still open");
            let _ = self.close();
        }
    }
}
