//! Broker configuration
//!
//! Loaded from a YAML file where every key is optional:
//!
//! ```yaml
//! uuid: 0b7c9d1e-5d4a-4c51-9a8e-2f1f2c7d9b10
//! tier2_url: http://10.0.0.2:5000
//! tier1_urls: [http://broker.example.org:5000]
//! matchers:
//!   default: [network, location, random]
//!   batch: [network, balance-cpu-mem]
//! cloudlets: ~/cloudlets.yaml
//! ```

pub mod validation;

pub use validation::{
    resolve_pipelines, validate_config, Pipelines, ValidationMessage, ValidationResult,
    ValidationSeverity,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cluster::{
    Cloudlet, CloudletSpec, DEPLOYMENT_EXPIRY_INTERVAL_SECS, REPORT_INTERVAL_SECS,
    STALENESS_SECS, SWEEP_INTERVAL_SECS,
};
use crate::matcher::RegistryError;

/// Default port for the Tier1 API
pub const DEFAULT_PORT: u16 = 5000;

/// Pipeline used when a request names no deployment class
pub const DEFAULT_CLASS: &str = "default";

/// Directory name under the platform config dir
pub const APP_DIR: &str = "cloudlet-broker";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Matcher configuration error: {0}")]
    Pipeline(#[from] RegistryError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Identity of this broker when reporting upward
    pub uuid: Uuid,

    /// Base URL of this node, as seen by its parents
    pub tier2_url: Option<String>,

    /// Parent brokers to report resources to
    pub tier1_urls: Vec<String>,

    pub sweep_interval_secs: u64,
    pub staleness_secs: u64,
    pub deployment_expiry_interval_secs: u64,
    pub report_interval_secs: u64,

    /// Upper bound for one heartbeat POST
    pub report_timeout_secs: u64,

    /// CSV file receiving one row per report
    pub telemetry_path: String,

    /// Stage names per deployment class
    pub matchers: BTreeMap<String, Vec<String>>,

    /// YAML list of cloudlets to preseed the registry with
    pub cloudlets: Option<PathBuf>,

    pub bind_addr: String,
    pub port: u16,

    /// Cap on candidates returned by one match request
    pub max_results: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let mut matchers = BTreeMap::new();
        matchers.insert(
            DEFAULT_CLASS.to_string(),
            vec!["network".into(), "location".into(), "random".into()],
        );

        Self {
            uuid: Uuid::new_v4(),
            tier2_url: None,
            tier1_urls: Vec::new(),
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            staleness_secs: STALENESS_SECS,
            deployment_expiry_interval_secs: DEPLOYMENT_EXPIRY_INTERVAL_SECS,
            report_interval_secs: REPORT_INTERVAL_SECS,
            report_timeout_secs: 10,
            telemetry_path: "./tier2_metrics.csv".to_string(),
            matchers,
            cloudlets: None,
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_results: 3,
        }
    }
}

impl BrokerConfig {
    /// Endpoint clients deploy to on this node
    pub fn deploy_endpoint(&self) -> Option<String> {
        self.tier2_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| format!("{}/api/v1/deploy", url.trim_end_matches('/')))
    }

    /// Telemetry path with `~` expanded
    pub fn telemetry_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.telemetry_path).as_ref())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn deployment_expiry_interval(&self) -> Duration {
        Duration::from_secs(self.deployment_expiry_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }

    /// Whether the upstream reporting job should run
    pub fn reports_upstream(&self) -> bool {
        !self.tier1_urls.is_empty() && self.deploy_endpoint().is_some()
    }
}

// ============================================================================
// Pure parsing
// ============================================================================

/// Parse a config from YAML. An empty document yields the defaults.
pub fn parse_config(content: &str) -> Result<BrokerConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(BrokerConfig::default());
    }
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<config>".to_string(),
        message: e.to_string(),
    })
}

/// Parse a YAML list of cloudlets
pub fn parse_cloudlets(content: &str) -> Result<Vec<Cloudlet>, ConfigError> {
    let specs: Vec<CloudletSpec> =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: "<cloudlets>".to_string(),
            message: e.to_string(),
        })?;
    Ok(specs.into_iter().map(Cloudlet::from).collect())
}

// ============================================================================
// I/O wrappers
// ============================================================================

/// `$XDG_CONFIG_HOME/cloudlet-broker/config.yaml` or platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
}

pub fn load_config_file(path: &Path) -> Result<BrokerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content).map_err(|e| with_path(e, path))
}

/// Load the explicit config file, else the default one if it exists, else
/// the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<BrokerConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config_file(&path),
        _ => Ok(BrokerConfig::default()),
    }
}

pub fn load_cloudlets_file(path: &Path) -> Result<Vec<Cloudlet>, ConfigError> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = std::fs::read_to_string(&expanded)?;
    parse_cloudlets(&content).map_err(|e| with_path(e, path))
}

fn with_path(err: ConfigError, path: &Path) -> ConfigError {
    match err {
        ConfigError::ParseError { message, .. } => ConfigError::ParseError {
            path: path.display().to_string(),
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.staleness_secs, 300);
        assert_eq!(config.deployment_expiry_interval_secs, 60);
        assert_eq!(config.report_interval_secs, 5);
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_results, 3);
        assert_eq!(
            config.matchers[DEFAULT_CLASS],
            vec!["network", "location", "random"]
        );
        assert!(!config.reports_upstream());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config = parse_config(
            r#"
tier2_url: http://10.0.0.2:5000/
tier1_urls:
  - http://broker.example.org:5000
matchers:
  batch: [network, balance-cpu-mem]
"#,
        )
        .unwrap();

        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(
            config.deploy_endpoint().as_deref(),
            Some("http://10.0.0.2:5000/api/v1/deploy")
        );
        assert!(config.reports_upstream());
        // A configured matcher table replaces the default one
        assert!(!config.matchers.contains_key(DEFAULT_CLASS));
        assert_eq!(config.matchers["batch"], vec!["network", "balance-cpu-mem"]);
    }

    #[test]
    fn test_blank_tier2_url_disables_reporting() {
        let config = parse_config("tier2_url: ''\ntier1_urls: [http://a]\n").unwrap();
        assert!(config.deploy_endpoint().is_none());
        assert!(!config.reports_upstream());
    }

    #[test]
    fn test_parse_error_names_file() {
        let file = create_temp_file("port: [not a port");
        let err = load_config_file(file.path()).unwrap_err();
        match err {
            ConfigError::ParseError { path, .. } => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config(Some(Path::new("/nonexistent/broker.yaml")));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_load_cloudlets_file() {
        let file = create_temp_file(
            r#"
- uuid: 7d3f4ad8-3b1e-4f7e-9a63-8f1c2b0e5d11
  name: cmu
  endpoint: http://128.2.0.10:5000/api/v1/deploy
  location: {latitude: 40.44, longitude: -79.94}
  local_networks: [128.2.0.0/16]
- name: lab
  endpoint: http://10.0.0.3:5000/api/v1/deploy
  rejected_clients: [10.1.0.0/16]
"#,
        );

        let cloudlets = load_cloudlets_file(file.path()).unwrap();

        assert_eq!(cloudlets.len(), 2);
        assert_eq!(cloudlets[0].name, "cmu");
        assert!(cloudlets[0].location.is_some());
        assert_eq!(cloudlets[0].local_networks.len(), 1);
        assert!(cloudlets[1].last_update.is_none());
        assert_eq!(cloudlets[1].rejected_clients.len(), 1);
    }

    #[test]
    fn test_telemetry_path_expands_tilde() {
        let config = BrokerConfig {
            telemetry_path: "~/metrics.csv".to_string(),
            ..Default::default()
        };
        assert!(!config.telemetry_path().to_string_lossy().starts_with('~'));
    }
}
