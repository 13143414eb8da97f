//! # Cloudlet matching pipeline
//!
//! A pipeline is an ordered list of stages run over a shared candidate pool.
//! Each stage follows the same contract:
//!
//! - It is started with the client and recipe and then pulled for results,
//!   one at a time, with mutable access to the pool on every pull.
//! - It **owns what it touches**: every cloudlet it decides about (accept or
//!   reject) is removed from the pool, and only undecided cloudlets stay
//!   behind for later stages.
//! - Accepted cloudlets are yielded exactly once; rejected ones are dropped.
//!
//! [`BestMatch`] chains the stages into one lazy best-first sequence. A stage
//! is only started once every earlier stage is exhausted, so pool-draining
//! stages never run unless the consumer actually gets that far.
//!
//! ```text
//!   pool ──▶ network ──▶ location ──▶ random ──▶ (resource stages)
//!             yields       yields      yields      drain everything
//!             locals       nearest     the rest
//! ```

pub mod location;
pub mod network;
pub mod random;
pub mod registry;
pub mod resources;

use std::sync::Arc;

use thiserror::Error;

use crate::cluster::{ClientInfo, Cloudlet, DeploymentRecipe};

pub use location::LocationStage;
pub use network::NetworkStage;
pub use random::RandomStage;
pub use registry::{MatchPipeline, RegistryError, StageRegistry};
pub use resources::{ResourcePolicy, ResourceStage};

/// Outcome of a matching run that did not produce a cloudlet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("No eligible cloudlet found by stage '{stage}'")]
    NoEligibleCandidate { stage: String },
}

/// What a stage decided about a single candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Remove from the pool and yield
    Accept,
    /// Remove from the pool without yielding
    Reject,
    /// Leave in the pool for later stages
    Defer,
}

/// Item produced by a stage or pipeline
pub type MatchResult = Result<Cloudlet, MatchError>;

/// A running stage, pulled for one result at a time.
///
/// Implementations must only return cloudlets they removed from `pool`.
pub trait Selection {
    fn next(&mut self, pool: &mut Vec<Cloudlet>) -> Option<MatchResult>;
}

/// A pluggable filter/ranking stage
pub trait Stage: Send + Sync {
    /// Name used in pipeline configuration
    fn name(&self) -> &str;

    /// Start a selection run for one request
    fn start<'a>(
        &'a self,
        client: &'a ClientInfo,
        recipe: &'a DeploymentRecipe,
    ) -> Box<dyn Selection + 'a>;

    /// Whether this stage always empties the pool. Such stages must be
    /// last in a pipeline.
    fn drains_pool(&self) -> bool {
        false
    }
}

/// Lazy, best-first sequence over a chain of stages
pub struct BestMatch<'a> {
    stages: &'a [Arc<dyn Stage>],
    client: &'a ClientInfo,
    recipe: &'a DeploymentRecipe,
    pool: &'a mut Vec<Cloudlet>,
    next_stage: usize,
    current: Option<Box<dyn Selection + 'a>>,
}

impl Iterator for BestMatch<'_> {
    type Item = MatchResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let stages = self.stages;
                let stage = stages.get(self.next_stage)?;
                self.next_stage += 1;
                self.current = Some(stage.start(self.client, self.recipe));
            }

            let selection = self.current.as_mut()?;
            match selection.next(self.pool) {
                Some(item) => return Some(item),
                None => self.current = None,
            }
        }
    }
}

impl BestMatch<'_> {
    /// Collect up to `limit` cloudlets.
    ///
    /// Errors only surface when nothing was found; a stage failing after
    /// earlier stages already produced candidates ends the run quietly.
    pub fn take_best(self, limit: usize) -> Result<Vec<Cloudlet>, MatchError> {
        let mut found = Vec::new();
        let mut failure = None;
        if limit == 0 {
            return Ok(found);
        }
        for item in self {
            match item {
                Ok(cloudlet) => {
                    found.push(cloudlet);
                    if found.len() >= limit {
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        match failure {
            Some(e) if found.is_empty() => Err(e),
            _ => Ok(found),
        }
    }
}

/// Run `stages` in order over `pool`, yielding candidates best-first.
///
/// Nothing is evaluated until the returned iterator is pulled.
pub fn best_match<'a>(
    stages: &'a [Arc<dyn Stage>],
    client: &'a ClientInfo,
    recipe: &'a DeploymentRecipe,
    pool: &'a mut Vec<Cloudlet>,
) -> BestMatch<'a> {
    BestMatch {
        stages,
        client,
        recipe,
        pool,
        next_stage: 0,
        current: None,
    }
}

/// Remove the cloudlet with `uuid` from the pool, if still present
pub(crate) fn take_from_pool(pool: &mut Vec<Cloudlet>, uuid: &uuid::Uuid) -> Option<Cloudlet> {
    let index = pool.iter().position(|c| &c.uuid == uuid)?;
    Some(pool.remove(index))
}


#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::test_support::*;
    use super::*;

    /// Accepts one named cloudlet and counts how often it was started
    struct Picky {
        wanted: &'static str,
        started: std::sync::atomic::AtomicUsize,
    }

    struct PickySelection<'a> {
        wanted: &'a str,
        done: bool,
    }

    impl Selection for PickySelection<'_> {
        fn next(&mut self, pool: &mut Vec<Cloudlet>) -> Option<MatchResult> {
            if self.done {
                return None;
            }
            self.done = true;
            let index = pool.iter().position(|c| c.name == self.wanted)?;
            Some(Ok(pool.remove(index)))
        }
    }

    impl Stage for Picky {
        fn name(&self) -> &str {
            "picky"
        }

        fn start<'a>(
            &'a self,
            _client: &'a ClientInfo,
            _recipe: &'a DeploymentRecipe,
        ) -> Box<dyn Selection + 'a> {
            self.started
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::new(PickySelection {
                wanted: self.wanted,
                done: false,
            })
        }
    }

    fn picky(wanted: &'static str) -> Arc<Picky> {
        Arc::new(Picky {
            wanted,
            started: Default::default(),
        })
    }

    #[test]
    fn test_stages_run_in_order() {
        let stages: Vec<Arc<dyn Stage>> = vec![picky("b"), picky("a")];
        let mut pool = vec![cloudlet("a"), cloudlet("b"), cloudlet("c")];
        let client = client("10.0.0.1");
        let recipe = recipe();

        let found: Vec<_> = best_match(&stages, &client, &recipe, &mut pool)
            .map(Result::unwrap)
            .collect();

        assert_eq!(names(&found), vec!["b", "a"]);
        assert_eq!(names(&pool), vec!["c"]);
    }

    #[test]
    fn test_later_stages_not_started_until_pulled() {
        let first = picky("a");
        let second = picky("b");
        let stages: Vec<Arc<dyn Stage>> = vec![first.clone(), second.clone()];
        let mut pool = vec![cloudlet("a"), cloudlet("b")];
        let client = client("10.0.0.1");
        let recipe = recipe();

        {
            let mut matches = best_match(&stages, &client, &recipe, &mut pool);
            let best = matches.next().unwrap().unwrap();
            assert_eq!(best.name, "a");
        }

        use std::sync::atomic::Ordering;
        assert_eq!(first.started.load(Ordering::SeqCst), 1);
        assert_eq!(second.started.load(Ordering::SeqCst), 0);
        assert_eq!(names(&pool), vec!["b"]);
    }

    #[test]
    fn test_empty_pipeline_yields_nothing() {
        let stages: Vec<Arc<dyn Stage>> = vec![];
        let mut pool = vec![cloudlet("a")];
        let client = client("10.0.0.1");
        let recipe = recipe();

        assert_eq!(best_match(&stages, &client, &recipe, &mut pool).count(), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_full_pipeline_never_repeats() {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(NetworkStage),
            Arc::new(LocationStage),
            Arc::new(RandomStage),
        ];
        let mut pool: Vec<_> = (0..20).map(|i| cloudlet(&format!("c{}", i))).collect();
        let input: HashSet<_> = pool.iter().map(|c| c.uuid).collect();
        let client = client("10.0.0.1");
        let recipe = recipe();

        let found: Vec<_> = best_match(&stages, &client, &recipe, &mut pool)
            .map(Result::unwrap)
            .collect();
        let unique: HashSet<_> = found.iter().map(|c| c.uuid).collect();

        assert_eq!(unique.len(), found.len());
        assert!(unique.is_subset(&input));
        assert!(found.len() <= input.len());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_take_best_limits_results() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(RandomStage)];
        let mut pool: Vec<_> = (0..5).map(|i| cloudlet(&format!("c{}", i))).collect();
        let client = client("10.0.0.1");
        let recipe = recipe();

        let found = best_match(&stages, &client, &recipe, &mut pool)
            .take_best(3)
            .unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_take_best_reports_failure_only_when_empty() {
        let stages: Vec<Arc<dyn Stage>> = vec![
            picky("a"),
            Arc::new(ResourceStage::new(ResourcePolicy::FirstFit)),
        ];
        let client = client("10.0.0.1").with_requirements(crate::cluster::ResourceRequirements {
            cpu: 100.0,
            mem: 0.0,
            disk: 0.0,
        });
        let recipe = recipe();

        let mut pool = vec![cloudlet("a"), cloudlet("b")];
        let found = best_match(&stages, &client, &recipe, &mut pool)
            .take_best(3)
            .unwrap();
        assert_eq!(names(&found), vec!["a"]);

        let mut pool = vec![cloudlet("b")];
        let err = best_match(&stages, &client, &recipe, &mut pool)
            .take_best(3)
            .unwrap_err();
        assert!(matches!(err, MatchError::NoEligibleCandidate { .. }));
    }
}
