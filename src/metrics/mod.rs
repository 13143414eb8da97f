//! Resource snapshots for Tier1 reporting
//!
//! This module provides the resource record a node reports upward, a
//! `ClusterBackend` that measures the local host with the `sysinfo` crate,
//! and the CSV telemetry log written on every report.

pub mod telemetry;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, Networks, System};
use tokio::sync::Mutex;
use tracing::trace;

use crate::cluster::{ClusterBackend, ClusterError};

pub use telemetry::TelemetryLog;

/// Resource snapshot reported by a cluster
///
/// CPU figures are in cores, memory and disk in bytes, network rates in
/// bytes per second, ratios in `0.0..=1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSnapshot {
    pub cpu_ratio: f64,
    pub mem_ratio: f64,
    pub net_rx_rate: f64,
    pub net_tx_rate: f64,
    pub mem_avail: f64,
    pub cpu_avail: f64,
    pub cpu_used: f64,
    pub mem_used: f64,
    pub disk_avail: f64,
}

/// Probe state; `sysinfo` needs two refreshes to compute rates
struct SystemProbe {
    system: System,
    disks: Disks,
    networks: Networks,
    last_refresh: Instant,
}

impl SystemProbe {
    fn new() -> Self {
        Self {
            system: System::new_all(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_refresh: Instant::now(),
        }
    }

    fn sample(&mut self) -> ResourceSnapshot {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.disks.refresh(true);
        self.networks.refresh(true);

        let elapsed = self.last_refresh.elapsed().as_secs_f64();
        self.last_refresh = Instant::now();

        // CPU in cores busy / idle
        let cores = self.system.cpus().len() as f64;
        let cpu_ratio = (self.system.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);
        let cpu_used = cores * cpu_ratio;

        let total_mem = self.system.total_memory() as f64;
        let mem_avail = self.system.available_memory() as f64;
        let mem_used = (total_mem - mem_avail).max(0.0);
        let mem_ratio = if total_mem > 0.0 {
            mem_used / total_mem
        } else {
            0.0
        };

        let disk_avail = self
            .disks
            .iter()
            .map(|d| d.available_space() as f64)
            .sum();

        let (rx, tx) = self
            .networks
            .iter()
            .filter(|(name, _)| name.as_str() != "lo")
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx + data.received(), tx + data.transmitted())
            });
        let (net_rx_rate, net_tx_rate) = if elapsed > 0.0 {
            (rx as f64 / elapsed, tx as f64 / elapsed)
        } else {
            (0.0, 0.0)
        };

        ResourceSnapshot {
            cpu_ratio,
            mem_ratio,
            net_rx_rate,
            net_tx_rate,
            mem_avail,
            cpu_avail: (cores - cpu_used).max(0.0),
            cpu_used,
            mem_used,
            disk_avail,
        }
    }
}

/// Cluster backend measuring the local host.
///
/// It does not host deployments itself, so expiring them is a no-op.
pub struct SystemCluster {
    probe: Mutex<SystemProbe>,
}

impl SystemCluster {
    pub fn new() -> Self {
        Self {
            probe: Mutex::new(SystemProbe::new()),
        }
    }
}

impl Default for SystemCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterBackend for SystemCluster {
    async fn get_resources(&self) -> Result<ResourceSnapshot, ClusterError> {
        let mut probe = self.probe.lock().await;
        Ok(probe.sample())
    }

    async fn expire_inactive_deployments(&self) -> Result<(), ClusterError> {
        trace!("Local host runs no deployments, nothing to expire");
        Ok(())
    }
}
