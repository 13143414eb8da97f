//! Random stage: yields everything left in the pool in shuffled order.
//!
//! The pool is shuffled in place on the first pull and cloudlets leave it one
//! at a time as they are yielded.

use rand::seq::SliceRandom;
use tracing::info;

use super::{MatchResult, Selection, Stage};
use crate::cluster::{ClientInfo, Cloudlet, DeploymentRecipe};

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStage;

struct RandomSelection {
    shuffled: bool,
}

impl Selection for RandomSelection {
    fn next(&mut self, pool: &mut Vec<Cloudlet>) -> Option<MatchResult> {
        if !self.shuffled {
            pool.shuffle(&mut rand::thread_rng());
            self.shuffled = true;
        }

        let cloudlet = pool.pop()?;
        info!("random ({})", cloudlet.name);
        Some(Ok(cloudlet))
    }
}

impl Stage for RandomStage {
    fn name(&self) -> &str {
        "random"
    }

    fn start<'a>(
        &'a self,
        _client: &'a ClientInfo,
        _recipe: &'a DeploymentRecipe,
    ) -> Box<dyn Selection + 'a> {
        Box::new(RandomSelection { shuffled: false })
    }

    fn drains_pool(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::matcher::best_match;
    use crate::matcher::test_support::*;

    #[test]
    fn test_removes_only_what_it_yields() {
        let mut pool: Vec<_> = ["a", "b", "c", "d"].iter().map(|n| cloudlet(n)).collect();
        let client = client("10.0.0.1");
        let recipe = recipe();
        let stages: Vec<std::sync::Arc<dyn Stage>> = vec![std::sync::Arc::new(RandomStage)];

        let first = best_match(&stages, &client, &recipe, &mut pool)
            .next()
            .unwrap()
            .unwrap();

        assert_eq!(pool.len(), 3);
        assert!(!pool.contains(&first));
    }

    #[test]
    fn test_drains_pool_and_yields_everything() {
        let mut pool: Vec<_> = ["a", "b", "c", "d"].iter().map(|n| cloudlet(n)).collect();
        let client = client("10.0.0.1");
        let recipe = recipe();
        let stage = RandomStage;
        let mut selection = stage.start(&client, &recipe);

        let first = selection.next(&mut pool).unwrap().unwrap();
        assert_eq!(pool.len(), 3);

        let mut seen = vec![first.name];
        while let Some(item) = selection.next(&mut pool) {
            seen.push(item.unwrap().name);
        }
        assert!(pool.is_empty());
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_empty_pool() {
        let mut pool = Vec::new();
        let client = client("10.0.0.1");
        let recipe = recipe();
        let stage = RandomStage;
        assert!(stage.start(&client, &recipe).next(&mut pool).is_none());
    }

    #[test]
    fn test_positions_roughly_uniform() {
        const RUNS: usize = 6000;
        let template: Vec<_> = ["a", "b", "c"].iter().map(|n| cloudlet(n)).collect();
        let client = client("10.0.0.1");
        let recipe = recipe();
        let stage = RandomStage;

        let mut first_place: HashMap<String, usize> = HashMap::new();
        for _ in 0..RUNS {
            let mut pool = template.clone();
            let mut selection = stage.start(&client, &recipe);
            let first = selection.next(&mut pool).unwrap().unwrap();
            *first_place.entry(first.name).or_default() += 1;
        }

        // Expect ~2000 each; the bound is many standard deviations wide
        for name in ["a", "b", "c"] {
            let count = first_place.get(name).copied().unwrap_or(0);
            assert!((1600..=2400).contains(&count), "{name}: {count}");
        }
    }
}
