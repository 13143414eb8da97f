//! Upstream reporting
//!
//! Every tick this node samples its cluster, appends the sample to the local
//! telemetry CSV and posts a heartbeat to each configured Tier1 broker.
//! Deliveries are independent: one unreachable parent never holds up or
//! cancels the others, and failures stay inside the job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Job, JobError};
use crate::cluster::ClusterBackend;
use crate::config::BrokerConfig;
use crate::metrics::{ResourceSnapshot, TelemetryLog};

/// Errors from a single heartbeat delivery
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },
}

/// Wire body of `POST {tier1}/api/v1/cloudlets/`
#[derive(Debug, Serialize)]
struct Heartbeat<'a> {
    uuid: Uuid,
    endpoint: &'a str,
    resources: &'a ResourceSnapshot,
}

/// Outcome of one reporting round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub delivered: usize,
    pub failed: usize,
}

pub struct ReportJob {
    uuid: Uuid,
    endpoint: String,
    tier1_urls: Vec<String>,
    cluster: Arc<dyn ClusterBackend>,
    telemetry: TelemetryLog,
    http_client: Client,
}

impl ReportJob {
    pub const ID: &'static str = "report_to_tier1";

    pub fn new(
        uuid: Uuid,
        endpoint: impl Into<String>,
        tier1_urls: Vec<String>,
        cluster: Arc<dyn ClusterBackend>,
        telemetry: TelemetryLog,
        timeout: Duration,
    ) -> Result<Self, JobError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            uuid,
            endpoint: endpoint.into(),
            tier1_urls,
            cluster,
            telemetry,
            http_client,
        })
    }

    /// Build the job from config. `None` when there is no parent to report
    /// to or this node has no endpoint of its own.
    pub fn from_config(
        config: &BrokerConfig,
        cluster: Arc<dyn ClusterBackend>,
    ) -> Result<Option<Self>, JobError> {
        let Some(endpoint) = config.deploy_endpoint() else {
            return Ok(None);
        };
        if config.tier1_urls.is_empty() {
            return Ok(None);
        }

        Self::new(
            config.uuid,
            endpoint,
            config.tier1_urls.clone(),
            cluster,
            TelemetryLog::new(config.telemetry_path()),
            config.report_timeout(),
        )
        .map(Some)
    }

    /// Sample, log and deliver once
    pub async fn report_once(&self) -> Result<ReportSummary, JobError> {
        let snapshot = self.cluster.get_resources().await?;

        if let Err(e) = self.telemetry.append(Utc::now(), &snapshot).await {
            warn!(
                "Failed to append telemetry to {}: {}",
                self.telemetry.path().display(),
                e
            );
        }

        let heartbeat = Heartbeat {
            uuid: self.uuid,
            endpoint: &self.endpoint,
            resources: &snapshot,
        };

        let results = join_all(
            self.tier1_urls
                .iter()
                .map(|url| self.deliver(url, &heartbeat)),
        )
        .await;

        let mut summary = ReportSummary::default();
        for (url, result) in self.tier1_urls.iter().zip(results) {
            match result {
                Ok(()) => {
                    debug!("Reported to {}", url);
                    summary.delivered += 1;
                }
                Err(e) => {
                    warn!("Failed to report to {}: {}", url, e);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn deliver(&self, tier1_url: &str, heartbeat: &Heartbeat<'_>) -> Result<(), DeliveryError> {
        let url = format!("{}/api/v1/cloudlets/", tier1_url.trim_end_matches('/'));

        let response = self.http_client.post(&url).json(heartbeat).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::ServerError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Job for ReportJob {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(&self) -> Result<(), JobError> {
        let summary = self.report_once().await?;
        if summary.failed > 0 && summary.delivered == 0 {
            info!("No Tier1 broker reachable this round");
        }
        Ok(())
    }
}
