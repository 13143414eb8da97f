//! Stage registry and pipeline assembly
//!
//! Pipelines are configured as lists of stage names. Names are resolved once
//! at startup; an unknown name is a configuration error and no request is
//! ever served with a half-resolved pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::{best_match, BestMatch, LocationStage, NetworkStage, RandomStage, Stage};
use super::{ResourcePolicy, ResourceStage};
use crate::cluster::{ClientInfo, Cloudlet, DeploymentRecipe};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown matcher stage '{0}'")]
    UnknownStage(String),

    #[error("Pipeline '{0}' has no stages")]
    EmptyPipeline(String),
}

/// Name → stage lookup table
#[derive(Clone)]
pub struct StageRegistry {
    stages: BTreeMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Registry without any stages
    pub fn empty() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }

    /// Registry with every built-in stage
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NetworkStage));
        registry.register(Arc::new(LocationStage));
        registry.register(Arc::new(RandomStage));
        for policy in ResourcePolicy::ALL {
            registry.register(Arc::new(ResourceStage::new(policy)));
        }
        registry
    }

    /// Add a stage under its own name, replacing any previous one
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.name().to_string(), stage);
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Stage>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownStage(name.to_string()))
    }

    /// Resolve a list of names into a pipeline
    pub fn assemble<S: AsRef<str>>(
        &self,
        class: &str,
        names: &[S],
    ) -> Result<MatchPipeline, RegistryError> {
        if names.is_empty() {
            return Err(RegistryError::EmptyPipeline(class.to_string()));
        }
        let stages = names
            .iter()
            .map(|n| self.resolve(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MatchPipeline {
            class: class.to_string(),
            stages,
        })
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// A resolved, ready to run chain of stages
#[derive(Clone)]
pub struct MatchPipeline {
    class: String,
    stages: Vec<Arc<dyn Stage>>,
}

impl MatchPipeline {
    /// Deployment class this pipeline serves
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Stages that drain the pool but are followed by other stages.
    /// Anything after them never sees a candidate.
    pub fn shadowing_stages(&self) -> Vec<&str> {
        let last = self.stages.len().saturating_sub(1);
        self.stages[..last]
            .iter()
            .filter(|s| s.drains_pool())
            .map(|s| s.name())
            .collect()
    }

    pub fn best_match<'a>(
        &'a self,
        client: &'a ClientInfo,
        recipe: &'a DeploymentRecipe,
        pool: &'a mut Vec<Cloudlet>,
    ) -> BestMatch<'a> {
        best_match(&self.stages, client, recipe, pool)
    }
}

impl std::fmt::Debug for MatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchPipeline")
            .field("class", &self.class)
            .field("stages", &self.names())
            .finish()
    }
}
