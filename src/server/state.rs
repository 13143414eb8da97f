use std::sync::Arc;

use crate::cluster::CloudletRegistry;
use crate::config::{Pipelines, DEFAULT_CLASS};
use crate::matcher::MatchPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: CloudletRegistry,
    pub pipelines: Arc<Pipelines>,
    /// Cap on candidates returned per match request
    pub max_results: usize,
}

impl AppState {
    pub fn new(registry: CloudletRegistry, pipelines: Pipelines, max_results: usize) -> Self {
        Self {
            registry,
            pipelines: Arc::new(pipelines),
            max_results: max_results.max(1),
        }
    }

    /// Pipeline for a deployment class, `default` when none is given
    pub fn pipeline(&self, class: Option<&str>) -> Option<&MatchPipeline> {
        self.pipelines.get(class.unwrap_or(DEFAULT_CLASS))
    }

    /// Number of candidates to return for a requested count
    pub fn result_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(1).clamp(1, self.max_results)
    }
}
