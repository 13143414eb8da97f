//! Expiry jobs: stale cloudlets and inactive deployments

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{Job, JobError};
use crate::cluster::{ClusterBackend, CloudletRegistry};

/// Drops cloudlets whose last heartbeat is older than the staleness window
pub struct ExpireCloudletsJob {
    registry: CloudletRegistry,
    staleness: Duration,
}

impl ExpireCloudletsJob {
    pub const ID: &'static str = "expire_cloudlets";

    pub fn new(registry: CloudletRegistry, staleness: Duration) -> Self {
        Self {
            registry,
            staleness,
        }
    }
}

#[async_trait]
impl Job for ExpireCloudletsJob {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(&self) -> Result<(), JobError> {
        let window = chrono::Duration::from_std(self.staleness)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let removed = self.registry.expire_stale(cutoff).await;
        if removed.is_empty() {
            debug!("No stale cloudlets");
        } else {
            info!("Expired {} stale cloudlet(s)", removed.len());
        }
        Ok(())
    }
}

/// Asks the cluster to tear down deployments whose clients went away
pub struct ExpireDeploymentsJob {
    cluster: Arc<dyn ClusterBackend>,
}

impl ExpireDeploymentsJob {
    pub const ID: &'static str = "expire_deployments";

    pub fn new(cluster: Arc<dyn ClusterBackend>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Job for ExpireDeploymentsJob {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(&self) -> Result<(), JobError> {
        self.cluster.expire_inactive_deployments().await?;
        Ok(())
    }
}
