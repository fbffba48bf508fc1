use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::types::AdvertisementTemplate;

/// What a resync does with advertised hostnames missing from the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Only register missing hostnames; never withdraw anything.
    #[default]
    AddOnly,
    /// Also withdraw hostnames no running container claims any more.
    Prune,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub log_level: String,
    pub health_port: u16,
    pub health_bind_ip: IpAddr,
    pub label_host: String,
    pub service_type: String,
    pub service_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<IpAddr>,
    pub retry_delay_secs: u64,
    pub event_buffer: usize,
    pub resync_policy: ResyncPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            health_port: 5353,
            health_bind_ip: IpAddr::from([0, 0, 0, 0]),
            label_host: "mc-router.host".into(),
            service_type: "_minecraft._tcp.local.".into(),
            service_port: 25565,
            host_ip: None,
            retry_delay_secs: 5,
            event_buffer: 128,
            resync_policy: ResyncPolicy::AddOnly,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("mdns-publisher.toml"))
            .merge(Json::file("mdns-publisher.json"))
            // Plain variables understood by existing deployments.
            .merge(Env::raw().only(&["log_level", "health_port"]))
            .merge(Env::prefixed("MDNS_PUBLISHER_"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Self::figment()
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.label_host.trim().is_empty() {
            anyhow::bail!("label_host must not be empty");
        }
        if !self.service_type.ends_with(".local.") {
            anyhow::bail!(
                "service_type must end with '.local.', got '{}'",
                self.service_type
            );
        }
        if self.service_port == 0 {
            anyhow::bail!("service_port must not be zero");
        }
        if self.event_buffer == 0 {
            anyhow::bail!("event_buffer must not be zero");
        }
        if self.retry_delay_secs == 0 {
            anyhow::bail!("retry_delay_secs must not be zero");
        }
        Ok(())
    }

    pub fn health_bind(&self) -> SocketAddr {
        SocketAddr::new(self.health_bind_ip, self.health_port)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn template(&self) -> AdvertisementTemplate {
        AdvertisementTemplate {
            service_type: self.service_type.clone(),
            port: self.service_port,
        }
    }
}
