//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use thiserror::Error;

use super::ServeArgs;
use crate::cluster::CloudletSummary;
use crate::config::{BrokerConfig, ConfigError, DEFAULT_CLASS};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Server(String),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Serve (pure)
// ============================================================================

/// Apply command line overrides on top of a loaded config
pub fn apply_serve_args(mut config: BrokerConfig, args: &ServeArgs) -> BrokerConfig {
    if let Some(ref bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if !args.matchers.is_empty() {
        config
            .matchers
            .insert(DEFAULT_CLASS.to_string(), args.matchers.clone());
    }
    if !args.tier1_urls.is_empty() {
        config.tier1_urls = args
            .tier1_urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
    }
    if let Some(ref tier2_url) = args.tier2_url {
        config.tier2_url = Some(tier2_url.clone());
    }
    if let Some(uuid) = args.uuid {
        config.uuid = uuid;
    }
    if let Some(ref cloudlets) = args.cloudlets {
        config.cloudlets = Some(cloudlets.clone());
    }
    if let Some(ref telemetry_path) = args.telemetry_path {
        config.telemetry_path = telemetry_path.clone();
    }
    config
}

// ============================================================================
// HTTP Client for a running broker
// ============================================================================

/// Client for the Tier1 API of a running broker
pub struct BrokerClient {
    client: reqwest::Client,
    base_url: String,
}

impl BrokerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// List known cloudlets
    pub async fn list_cloudlets(&self) -> CommandResult<Vec<CloudletSummary>> {
        let url = format!("{}/api/v1/cloudlets/", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(CommandError::Server(format!(
                "Listing cloudlets failed: {}",
                resp.status()
            )));
        }

        Ok(resp.json().await?)
    }
}
