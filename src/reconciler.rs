//! Registration table and the reconciliation operations over it.
//!
//! The [`Reconciler`] owns the table mapping hostname to its active
//! [`Advertisement`] and is the only writer.  Every mutation goes through
//! the [`Publisher`] first, so the table always mirrors what is actually
//! on the wire:
//!
//! * a rejected announcement never enters the table,
//! * a rejected withdrawal leaves its entry in place.
//!
//! Each operation takes the table lock for its whole duration, which makes
//! it atomic with respect to concurrent readers and to shutdown.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::RwLock;

use crate::config::ResyncPolicy;
use crate::publisher::Publisher;
use crate::types::{Advertisement, AdvertisementTemplate};

/// Outcome of a resync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub added: usize,
    pub pruned: usize,
}

pub struct Reconciler {
    publisher: Arc<dyn Publisher>,
    template: AdvertisementTemplate,
    policy: ResyncPolicy,
    table: RwLock<BTreeMap<String, Advertisement>>,
}

impl Reconciler {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        template: AdvertisementTemplate,
        policy: ResyncPolicy,
    ) -> Self {
        Self {
            publisher,
            template,
            policy,
            table: RwLock::new(BTreeMap::new()),
        }
    }

    /// Announces `hostname` and records it.  Returns `false` if the
    /// hostname is already advertised, another hostname already holds the
    /// same record, or the publisher rejects it.
    pub async fn register(&self, hostname: &str, ip: IpAddr) -> bool {
        let mut table = self.table.write().await;
        if table.contains_key(hostname) {
            warn!("Hostname {} already registered, skipping", hostname);
            return false;
        }

        let ad = Advertisement::new(hostname, ip, &self.template);
        // The engine keys records by lowercased instance name, so `foo`,
        // `foo.local` and `Foo.local` all land on the same record.
        if let Some(holder) = table
            .values()
            .find(|other| other.service_name.eq_ignore_ascii_case(&ad.service_name))
        {
            warn!(
                "Hostname {} conflicts with {} on record {}, skipping",
                hostname, holder.hostname, holder.service_name
            );
            return false;
        }

        match self.publisher.announce(&ad) {
            Ok(()) => {
                table.insert(hostname.to_string(), ad);
                info!("Registered mDNS: {} -> {}", hostname, ip);
                true
            }
            Err(e) => {
                error!("Failed to register mDNS for {}: {}", hostname, e);
                false
            }
        }
    }

    /// Withdraws and forgets `hostname`.  Returns `false` if it was not
    /// advertised or the publisher rejects the withdrawal.
    pub async fn unregister(&self, hostname: &str) -> bool {
        let mut table = self.table.write().await;
        self.unregister_locked(&mut table, hostname)
    }

    fn unregister_locked(
        &self,
        table: &mut BTreeMap<String, Advertisement>,
        hostname: &str,
    ) -> bool {
        let Some(ad) = table.get(hostname) else {
            warn!("Hostname {} not registered, skipping", hostname);
            return false;
        };

        match self.publisher.withdraw(ad) {
            Ok(()) => {
                table.remove(hostname);
                info!("Unregistered mDNS: {}", hostname);
                true
            }
            Err(e) => {
                error!("Failed to unregister mDNS for {}: {}", hostname, e);
                false
            }
        }
    }

    /// Registers every hostname in `hostnames` that is not yet advertised.
    ///
    /// With [`ResyncPolicy::Prune`] entries absent from `hostnames` are
    /// withdrawn as well; with the default [`ResyncPolicy::AddOnly`] they
    /// are kept.
    pub async fn resync(&self, hostnames: &BTreeSet<String>, ip: IpAddr) -> ResyncSummary {
        let mut summary = ResyncSummary::default();

        if self.policy == ResyncPolicy::Prune {
            let mut table = self.table.write().await;
            let stale: Vec<String> = table
                .keys()
                .filter(|h| !hostnames.contains(*h))
                .cloned()
                .collect();
            for hostname in stale {
                info!("Pruning {}: no running container claims it", hostname);
                if self.unregister_locked(&mut table, &hostname) {
                    summary.pruned += 1;
                }
            }
        }

        for hostname in hostnames {
            if self.contains(hostname).await {
                continue;
            }
            if self.register(hostname, ip).await {
                summary.added += 1;
            }
        }

        info!(
            "Resync complete: {} added, {} pruned, {} advertised",
            summary.added,
            summary.pruned,
            self.len().await
        );
        summary
    }

    /// Withdraws every advertised hostname.  Returns how many were withdrawn.
    pub async fn withdraw_all(&self) -> usize {
        let mut table = self.table.write().await;
        let hostnames: Vec<String> = table.keys().cloned().collect();
        hostnames
            .iter()
            .filter(|hostname| self.unregister_locked(&mut table, hostname))
            .count()
    }

    /// Advertised hostnames in lexical order.
    pub async fn snapshot_hostnames(&self) -> Vec<String> {
        self.table.read().await.keys().cloned().collect()
    }

    #[cfg(test)]
    pub async fn get(&self, hostname: &str) -> Option<Advertisement> {
        self.table.read().await.get(hostname).cloned()
    }

    pub async fn contains(&self, hostname: &str) -> bool {
        self.table.read().await.contains_key(hostname)
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }
}
