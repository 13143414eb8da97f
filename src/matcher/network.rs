//! Network affinity stage
//!
//! Walks the pool in input order and decides per cloudlet:
//! - client address in `rejected_clients` → reject
//! - client address in `local_networks` → accept
//! - `accepted_clients` non-empty and the address is in none of them → reject
//! - otherwise → defer to later stages

use tracing::{debug, info};

use super::{Decision, MatchResult, Selection, Stage};
use crate::cluster::{ClientInfo, Cloudlet, DeploymentRecipe};

#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStage;

/// Decide about one cloudlet for this client
pub fn decide(client: &ClientInfo, cloudlet: &Cloudlet) -> Decision {
    let addr = &client.ipaddress;
    if cloudlet.rejects(addr) {
        Decision::Reject
    } else if cloudlet.is_local_to(addr) {
        Decision::Accept
    } else if !cloudlet.accepts(addr) {
        Decision::Reject
    } else {
        Decision::Defer
    }
}

struct NetworkSelection<'a> {
    client: &'a ClientInfo,
    cursor: usize,
}

impl Selection for NetworkSelection<'_> {
    fn next(&mut self, pool: &mut Vec<Cloudlet>) -> Option<MatchResult> {
        while self.cursor < pool.len() {
            let cloudlet = &pool[self.cursor];
            match decide(self.client, cloudlet) {
                Decision::Accept => {
                    info!("network ({})", cloudlet.name);
                    return Some(Ok(pool.remove(self.cursor)));
                }
                Decision::Reject => {
                    debug!(
                        "Cloudlet ({}) will not serve client {}",
                        cloudlet.name, self.client.ipaddress
                    );
                    pool.remove(self.cursor);
                }
                Decision::Defer => self.cursor += 1,
            }
        }
        None
    }
}

impl Stage for NetworkStage {
    fn name(&self) -> &str {
        "network"
    }

    fn start<'a>(
        &'a self,
        client: &'a ClientInfo,
        _recipe: &'a DeploymentRecipe,
    ) -> Box<dyn Selection + 'a> {
        Box::new(NetworkSelection { client, cursor: 0 })
    }
}
