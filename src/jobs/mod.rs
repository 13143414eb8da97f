//! Interval job scheduler
//!
//! Every job gets its own loop on the shared runtime and a run guard:
//! - at most one instance of a job runs at any time
//! - a tick that finds the previous run still going is skipped
//! - missed ticks collapse into a single run instead of being replayed
//!
//! A failing or panicking run is logged and the loop keeps ticking.

pub mod expire;
pub mod report;

pub use expire::{ExpireCloudletsJob, ExpireDeploymentsJob};
pub use report::{DeliveryError, ReportJob, ReportSummary};

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::cluster::ClusterError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A unit of periodic work
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Stable identifier, also the replacement key in the scheduler
    fn id(&self) -> &str;

    async fn run(&self) -> Result<(), JobError>;
}

/// Result of one attempted run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// Previous run still in progress
    Skipped,
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    guard: Arc<Mutex<()>>,
    period: Duration,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    jobs: StdMutex<HashMap<String, ScheduledJob>>,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: StdMutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Register `job` to run every `period`, first one period from now.
    /// A job with the same id is stopped and replaced.
    pub fn add_job(&self, job: Arc<dyn Job>, period: Duration) {
        let id = job.id().to_string();
        let guard = Arc::new(Mutex::new(()));
        let handle = tokio::spawn(run_loop(
            job.clone(),
            guard.clone(),
            Instant::now() + period,
            period,
            self.shutdown.subscribe(),
        ));

        let previous = self.lock_jobs().insert(
            id.clone(),
            ScheduledJob {
                job,
                guard,
                period,
                handle,
            },
        );
        if let Some(previous) = previous {
            debug!("Replacing job {}", id);
            previous.handle.abort();
        }
        info!("Scheduled job {} every {:?}", id, period);
    }

    /// Run a job now, through the same guard as its scheduled ticks.
    /// Returns `None` for an unknown id.
    pub async fn trigger(&self, id: &str) -> Option<RunOutcome> {
        let (job, guard) = {
            let jobs = self.lock_jobs();
            let scheduled = jobs.get(id)?;
            (scheduled.job.clone(), scheduled.guard.clone())
        };
        Some(execute(job, &guard).await)
    }

    /// Ids and periods of registered jobs, sorted by id
    pub fn jobs(&self) -> Vec<(String, Duration)> {
        let mut jobs: Vec<_> = self
            .lock_jobs()
            .iter()
            .map(|(id, scheduled)| (id.clone(), scheduled.period))
            .collect();
        jobs.sort();
        jobs
    }

    /// Stop all job loops. A run in progress finishes first.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<_> = self
            .lock_jobs()
            .drain()
            .map(|(_, scheduled)| scheduled.handle)
            .collect();
        futures::future::join_all(handles).await;
        info!("Scheduler stopped");
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScheduledJob>> {
        // Nothing panics while holding this lock
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn run_loop(
    job: Arc<dyn Job>,
    guard: Arc<Mutex<()>>,
    first: Instant,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                execute(job.clone(), &guard).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("Job {} shutting down", job.id());
                    break;
                }
            }
        }
    }
}

/// Run once unless already running. The run happens in its own task so a
/// panic stays inside it.
async fn execute(job: Arc<dyn Job>, guard: &Mutex<()>) -> RunOutcome {
    let Ok(_running) = guard.try_lock() else {
        debug!("Job {} still running, skipping tick", job.id());
        return RunOutcome::Skipped;
    };

    let id = job.id().to_string();
    let run = tokio::spawn(async move { job.run().await });
    match run.await {
        Ok(Ok(())) => {
            debug!("Job {} completed", id);
            RunOutcome::Completed
        }
        Ok(Err(e)) => {
            error!("Job {} failed: {}", id, e);
            RunOutcome::Failed
        }
        Err(e) => {
            error!("Job {} aborted: {}", id, e);
            RunOutcome::Failed
        }
    }
}
