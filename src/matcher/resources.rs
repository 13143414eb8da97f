//! Resource admission and load ranking stages
//!
//! All of these take the whole pool on the first pull, drop every cloudlet
//! that fails the admission test and rank the rest according to their
//! [`ResourcePolicy`]. They always leave the pool empty, so they belong at
//! the end of a pipeline.
//!
//! Admission: `cpu_avail >= req.cpu && mem_avail >= req.mem && disk_avail >= req.disk`

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use super::{MatchError, MatchResult, Selection, Stage};
use crate::cluster::{ClientInfo, Cloudlet, DeploymentRecipe, ResourceRequirements};

/// How admissible cloudlets are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourcePolicy {
    /// First admissible cloudlet in pool order, nothing else
    FirstFit,
    /// Busiest CPU first
    RankCpu,
    /// Busiest by combined CPU and memory usage first
    RankCpuMem,
    /// Least combined CPU and memory usage after allocation first
    BalanceCpuMem,
    /// Single cloudlet with the least CPU usage after allocation
    BalanceCpu,
    /// Least memory usage after allocation first
    BalanceMem,
}

impl ResourcePolicy {
    pub const ALL: [ResourcePolicy; 6] = [
        ResourcePolicy::FirstFit,
        ResourcePolicy::RankCpu,
        ResourcePolicy::RankCpuMem,
        ResourcePolicy::BalanceCpuMem,
        ResourcePolicy::BalanceCpu,
        ResourcePolicy::BalanceMem,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourcePolicy::FirstFit => "resource-first-fit",
            ResourcePolicy::RankCpu => "resource-rank-cpu",
            ResourcePolicy::RankCpuMem => "resource-rank-cpu-mem",
            ResourcePolicy::BalanceCpuMem => "balance-cpu-mem",
            ResourcePolicy::BalanceCpu => "balance-cpu",
            ResourcePolicy::BalanceMem => "balance-mem",
        }
    }

    /// Ranking key, lower sorts first
    fn key(&self, cloudlet: &Cloudlet, reqs: &ResourceRequirements) -> f64 {
        let r = &cloudlet.resources;
        match self {
            ResourcePolicy::FirstFit => 0.0,
            ResourcePolicy::RankCpu => -r.cpu_used,
            ResourcePolicy::RankCpuMem => -r.cpu_used.hypot(r.mem_used),
            ResourcePolicy::BalanceCpuMem => (r.cpu_used + reqs.cpu).hypot(r.mem_used + reqs.mem),
            ResourcePolicy::BalanceCpu => r.cpu_used + reqs.cpu,
            ResourcePolicy::BalanceMem => r.mem_used + reqs.mem,
        }
    }

    /// Maximum number of cloudlets emitted
    fn limit(&self) -> Option<usize> {
        match self {
            ResourcePolicy::FirstFit | ResourcePolicy::BalanceCpu => Some(1),
            _ => None,
        }
    }

    fn rank(&self, mut admitted: Vec<Cloudlet>, reqs: &ResourceRequirements) -> Vec<Cloudlet> {
        if *self != ResourcePolicy::FirstFit {
            admitted.sort_by(|a, b| self.key(a, reqs).total_cmp(&self.key(b, reqs)));
        }
        if let Some(limit) = self.limit() {
            admitted.truncate(limit);
        }
        admitted
    }
}

impl fmt::Display for ResourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Whether `cloudlet` has room for `reqs`
pub fn admits(cloudlet: &Cloudlet, reqs: &ResourceRequirements) -> bool {
    let r = &cloudlet.resources;
    r.cpu_avail >= reqs.cpu && r.mem_avail >= reqs.mem && r.disk_avail >= reqs.disk
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceStage {
    policy: ResourcePolicy,
}

impl ResourceStage {
    pub fn new(policy: ResourcePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ResourcePolicy {
        self.policy
    }
}

enum ResourceState {
    Pending,
    Ranked(std::vec::IntoIter<Cloudlet>),
    Done,
}

struct ResourceSelection<'a> {
    policy: ResourcePolicy,
    reqs: &'a ResourceRequirements,
    state: ResourceState,
}

impl ResourceSelection<'_> {
    /// Take the whole pool and return the ranked admissible part
    fn evaluate(&self, pool: &mut Vec<Cloudlet>) -> Vec<Cloudlet> {
        let (admitted, rejected): (Vec<_>, Vec<_>) = std::mem::take(pool)
            .into_iter()
            .partition(|c| admits(c, self.reqs));

        for cloudlet in &rejected {
            debug!(
                "{} ({}) lacks resources: cpu {}/{}, mem {}/{}, disk {}/{}",
                self.policy,
                cloudlet.name,
                cloudlet.resources.cpu_avail,
                self.reqs.cpu,
                cloudlet.resources.mem_avail,
                self.reqs.mem,
                cloudlet.resources.disk_avail,
                self.reqs.disk
            );
        }

        self.policy.rank(admitted, self.reqs)
    }
}

impl Selection for ResourceSelection<'_> {
    fn next(&mut self, pool: &mut Vec<Cloudlet>) -> Option<MatchResult> {
        if let ResourceState::Pending = self.state {
            let ranked = self.evaluate(pool);
            if ranked.is_empty() {
                self.state = ResourceState::Done;
                return Some(Err(MatchError::NoEligibleCandidate {
                    stage: self.policy.name().to_string(),
                }));
            }
            self.state = ResourceState::Ranked(ranked.into_iter());
        }

        let ResourceState::Ranked(ranked) = &mut self.state else {
            return None;
        };
        let cloudlet = ranked.next()?;
        info!(
            "{} ({}) cpu_used {}, mem_used {}",
            self.policy, cloudlet.name, cloudlet.resources.cpu_used, cloudlet.resources.mem_used
        );
        Some(Ok(cloudlet))
    }
}

impl Stage for ResourceStage {
    fn name(&self) -> &str {
        self.policy.name()
    }

    fn start<'a>(
        &'a self,
        client: &'a ClientInfo,
        _recipe: &'a DeploymentRecipe,
    ) -> Box<dyn Selection + 'a> {
        Box::new(ResourceSelection {
            policy: self.policy,
            reqs: &client.resource_reqs,
            state: ResourceState::Pending,
        })
    }

    fn drains_pool(&self) -> bool {
        true
    }
}
