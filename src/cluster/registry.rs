//! Cloudlet Registry - process-wide map of known cloudlets
//!
//! The registry is the only state shared between the request path and the
//! background sweep. All access goes through one lock; operations are plain
//! insert/overwrite/delete so nothing finer grained is needed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::cloudlet::{Cloudlet, CloudletSummary, HeartbeatReport};

/// Shared handle to the set of known cloudlets
#[derive(Clone, Default)]
pub struct CloudletRegistry {
    cloudlets: Arc<RwLock<HashMap<Uuid, Cloudlet>>>,
}

impl CloudletRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preseeded with cloudlets
    pub fn with_cloudlets(cloudlets: impl IntoIterator<Item = Cloudlet>) -> Self {
        let map = cloudlets.into_iter().map(|c| (c.uuid, c)).collect();
        Self {
            cloudlets: Arc::new(RwLock::new(map)),
        }
    }

    /// Insert or replace a cloudlet
    pub async fn upsert(&self, cloudlet: Cloudlet) {
        self.cloudlets.write().await.insert(cloudlet.uuid, cloudlet);
    }

    /// Record a heartbeat, creating the cloudlet on first contact
    pub async fn apply_heartbeat(&self, report: HeartbeatReport) {
        let now = Utc::now();
        let mut cloudlets = self.cloudlets.write().await;
        match cloudlets.get_mut(&report.uuid) {
            Some(existing) => {
                debug!("Heartbeat from cloudlet {}", existing.name);
                existing.apply_heartbeat(report, now);
            }
            None => {
                let cloudlet = report.into_cloudlet(now);
                info!("Registered cloudlet {} ({})", cloudlet.name, cloudlet.uuid);
                cloudlets.insert(cloudlet.uuid, cloudlet);
            }
        }
    }

    /// Remove a cloudlet. Removing an unknown UUID is a no-op.
    pub async fn remove(&self, uuid: &Uuid) -> Option<Cloudlet> {
        self.cloudlets.write().await.remove(uuid)
    }

    pub async fn get(&self, uuid: &Uuid) -> Option<Cloudlet> {
        self.cloudlets.read().await.get(uuid).cloned()
    }

    /// Point-in-time copy of all cloudlets, used as a matching pool
    pub async fn snapshot(&self) -> Vec<Cloudlet> {
        self.cloudlets.read().await.values().cloned().collect()
    }

    pub async fn summaries(&self) -> Vec<CloudletSummary> {
        let mut summaries: Vec<_> = self
            .cloudlets
            .read()
            .await
            .values()
            .map(Cloudlet::summary)
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.cloudlets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cloudlets.read().await.is_empty()
    }

    /// Remove every cloudlet whose last heartbeat is older than `cutoff`.
    ///
    /// Cloudlets that never sent a heartbeat are kept. Candidates are taken
    /// from a snapshot and removed by key, re-checking staleness under the
    /// write lock so a heartbeat that lands in between keeps its cloudlet.
    pub async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Vec<Cloudlet> {
        let stale: Vec<Uuid> = self
            .cloudlets
            .read()
            .await
            .values()
            .filter(|c| is_stale(c, cutoff))
            .map(|c| c.uuid)
            .collect();

        if stale.is_empty() {
            return Vec::new();
        }

        let mut cloudlets = self.cloudlets.write().await;
        let mut removed = Vec::with_capacity(stale.len());
        for uuid in stale {
            let still_stale = cloudlets.get(&uuid).is_some_and(|c| is_stale(c, cutoff));
            if still_stale {
                if let Some(cloudlet) = cloudlets.remove(&uuid) {
                    info!("Removing stale cloudlet {} ({})", cloudlet.name, cloudlet.uuid);
                    removed.push(cloudlet);
                }
            }
        }
        removed
    }
}

fn is_stale(cloudlet: &Cloudlet, cutoff: DateTime<Utc>) -> bool {
    cloudlet.last_update.is_some_and(|t| t < cutoff)
}
