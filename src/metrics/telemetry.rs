//! Append-only CSV log of reported resource snapshots
//!
//! One row per report:
//! `<unix_timestamp>,<cpu_ratio>,<mem_ratio>,<net_rx_rate>,<net_tx_rate>,<mem_avail>,<cpu_avail>,<cpu_used>,<mem_used>`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::ResourceSnapshot;

#[derive(Debug, Clone)]
pub struct TelemetryLog {
    path: PathBuf,
}

impl TelemetryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, creating the file if needed
    pub async fn append(
        &self,
        at: DateTime<Utc>,
        snapshot: &ResourceSnapshot,
    ) -> std::io::Result<()> {
        let row = format_row(at, snapshot);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(row.as_bytes()).await?;
        file.flush().await
    }
}

fn format_row(at: DateTime<Utc>, s: &ResourceSnapshot) -> String {
    let timestamp = at.timestamp_millis() as f64 / 1000.0;
    format!(
        "{},{},{},{},{},{},{},{},{}\n",
        timestamp,
        s.cpu_ratio,
        s.mem_ratio,
        s.net_rx_rate,
        s.net_tx_rate,
        s.mem_avail,
        s.cpu_avail,
        s.cpu_used,
        s.mem_used
    )
}
