//! Cluster collaborator interface
//!
//! The orchestrator that actually runs workloads sits behind this trait. The
//! broker only asks it for a resource snapshot and to expire deployments
//! whose clients went away.

use async_trait::async_trait;
use thiserror::Error;

use crate::metrics::ResourceSnapshot;

/// Errors reported by a cluster backend
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Resource probe failed: {0}")]
    Probe(String),
}

#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Current resource usage of the cluster this broker fronts
    async fn get_resources(&self) -> Result<ResourceSnapshot, ClusterError>;

    /// Tear down deployments whose clients are no longer active. Idempotent.
    async fn expire_inactive_deployments(&self) -> Result<(), ClusterError>;
}
