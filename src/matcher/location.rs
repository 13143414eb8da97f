//! Geographic proximity stage
//!
//! Ranks every cloudlet with a known location by great-circle distance to
//! the client, nearest first. Cloudlets without a location are left in the
//! pool. Without a client location the stage does nothing.

use std::collections::VecDeque;

use tracing::info;
use uuid::Uuid;

use super::{take_from_pool, MatchResult, Selection, Stage};
use crate::cluster::geo::estimated_rtt_secs;
use crate::cluster::{ClientInfo, Cloudlet, DeploymentRecipe};

#[derive(Debug, Clone, Copy, Default)]
pub struct LocationStage;

struct LocationSelection<'a> {
    client: &'a ClientInfo,
    /// Ranked (uuid, distance) pairs, computed on the first pull
    ranked: Option<VecDeque<(Uuid, f64)>>,
}

impl LocationSelection<'_> {
    fn rank(&self, pool: &[Cloudlet]) -> VecDeque<(Uuid, f64)> {
        let Some(origin) = self.client.location else {
            return VecDeque::new();
        };

        let mut by_distance: Vec<(Uuid, f64)> = pool
            .iter()
            .filter_map(|c| c.distance_from(&origin).map(|d| (c.uuid, d)))
            .collect();
        by_distance.sort_by(|a, b| a.1.total_cmp(&b.1));
        by_distance.into()
    }
}

impl Selection for LocationSelection<'_> {
    fn next(&mut self, pool: &mut Vec<Cloudlet>) -> Option<MatchResult> {
        if self.ranked.is_none() {
            self.ranked = Some(self.rank(pool));
        }
        let ranked = self.ranked.as_mut()?;

        while let Some((uuid, distance)) = ranked.pop_front() {
            if let Some(cloudlet) = take_from_pool(pool, &uuid) {
                info!(
                    "distance ({}) {:.0} km, {:.3} minRTT",
                    cloudlet.name,
                    distance,
                    estimated_rtt_secs(distance)
                );
                return Some(Ok(cloudlet));
            }
        }
        None
    }
}

impl Stage for LocationStage {
    fn name(&self) -> &str {
        "location"
    }

    fn start<'a>(
        &'a self,
        client: &'a ClientInfo,
        _recipe: &'a DeploymentRecipe,
    ) -> Box<dyn Selection + 'a> {
        Box::new(LocationSelection {
            client,
            ranked: None,
        })
    }
}
