//! Configuration validation
//!
//! Checks a [`BrokerConfig`] against the stage registry before anything is
//! served. Errors stop startup; warnings are logged and the broker runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{BrokerConfig, ConfigError, DEFAULT_CLASS};
use crate::matcher::{MatchPipeline, StageRegistry};

/// Resolved pipelines by deployment class
pub type Pipelines = BTreeMap<String, MatchPipeline>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ValidationSeverity {
    /// May work but probably not what was meant
    Warning,
    /// Cannot run
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: ValidationSeverity,
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationMessage {
    fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Error,
            code: code.to_string(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Warning,
            code: code.to_string(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub messages: Vec<ValidationMessage>,
    pub passed: bool,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            passed: true,
        }
    }

    pub fn add(&mut self, msg: ValidationMessage) {
        if msg.severity == ValidationSeverity::Error {
            self.passed = false;
        }
        self.messages.push(msg);
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages
            .iter()
            .filter(|m| m.severity == ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages
            .iter()
            .filter(|m| m.severity == ValidationSeverity::Warning)
    }
}

pub fn validate_config(config: &BrokerConfig, registry: &StageRegistry) -> ValidationResult {
    let mut result = ValidationResult::new();

    let intervals = [
        ("sweep_interval_secs", config.sweep_interval_secs),
        ("staleness_secs", config.staleness_secs),
        (
            "deployment_expiry_interval_secs",
            config.deployment_expiry_interval_secs,
        ),
        ("report_interval_secs", config.report_interval_secs),
        ("report_timeout_secs", config.report_timeout_secs),
    ];
    for (field, value) in intervals {
        if value == 0 {
            result.add(ValidationMessage::error(
                "ZERO_INTERVAL",
                format!("{} must be greater than zero", field),
            ));
        }
    }

    if config.max_results == 0 {
        result.add(ValidationMessage::error(
            "ZERO_RESULTS",
            "max_results must be at least 1",
        ));
    }

    if !config.tier1_urls.is_empty() && config.deploy_endpoint().is_none() {
        result.add(
            ValidationMessage::warning(
                "NO_TIER2_URL",
                "tier1_urls are set but tier2_url is not, upstream reporting is disabled",
            )
            .suggest("set tier2_url to the base URL parents can reach this node on"),
        );
    }

    if !config.matchers.contains_key(DEFAULT_CLASS) {
        result.add(ValidationMessage::warning(
            "NO_DEFAULT_PIPELINE",
            format!(
                "no '{}' matcher pipeline, requests without a class will be refused",
                DEFAULT_CLASS
            ),
        ));
    }

    for (class, names) in &config.matchers {
        if names.is_empty() {
            result.add(ValidationMessage::error(
                "EMPTY_PIPELINE",
                format!("matcher pipeline '{}' has no stages", class),
            ));
            continue;
        }

        for (position, name) in names.iter().enumerate() {
            let Some(stage) = registry.get(name) else {
                result.add(
                    ValidationMessage::error(
                        "UNKNOWN_STAGE",
                        format!("pipeline '{}' uses unknown stage '{}'", class, name),
                    )
                    .suggest(format!(
                        "available: {}",
                        registry.names().collect::<Vec<_>>().join(", ")
                    )),
                );
                continue;
            };

            if stage.drains_pool() && position + 1 < names.len() {
                result.add(ValidationMessage::warning(
                    "SHADOWED_STAGES",
                    format!(
                        "pipeline '{}': stage '{}' consumes every candidate, later stages never run",
                        class, name
                    ),
                ));
            }
        }
    }

    result
}

/// Resolve every configured pipeline, failing on the first unknown stage
pub fn resolve_pipelines(
    config: &BrokerConfig,
    registry: &StageRegistry,
) -> Result<Pipelines, ConfigError> {
    config
        .matchers
        .iter()
        .map(|(class, names)| -> Result<_, ConfigError> {
            Ok((class.clone(), registry.assemble(class, names.as_slice())?))
        })
        .collect()
}
