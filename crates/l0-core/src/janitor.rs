//! Garbage collection of stale records.
//!
//! Tags outlive their remote resources whenever something is removed behind
//! the control plane's back. The tag janitor compares the tag store against
//! what is actually running and drops the leftovers; the job janitor expires
//! finished jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::ProviderResult;
use crate::job::JobStore;
use crate::tag::TagStore;
use crate::types::EntityType;

/// How long a job record is kept after creation.
pub const JOB_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// IDs of the entities of one type that still exist remotely.
pub trait LiveSet: Send + Sync {
    fn live_ids(&self) -> ProviderResult<Vec<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JanitorReport {
    /// Number of tags removed.
    pub deleted: usize,
    pub orphaned_ids: Vec<String>,
}

pub struct TagJanitor {
    store: Arc<dyn TagStore>,
    live: Arc<dyn LiveSet>,
    entity_type: EntityType,
}

impl std::fmt::Debug for TagJanitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagJanitor")
            .field("entity_type", &self.entity_type)
            .finish_non_exhaustive()
    }
}

impl TagJanitor {
    pub fn new(store: Arc<dyn TagStore>, live: Arc<dyn LiveSet>, entity_type: EntityType) -> Self {
        Self {
            store,
            live,
            entity_type,
        }
    }

    /// Deletes the tags of every tagged entity missing from the live set.
    ///
    /// A failure to read the live set aborts the pass before anything is
    /// deleted.
    pub fn run(&self) -> ProviderResult<JanitorReport> {
        let live = self.live.live_ids()?;
        let tags = self.store.select_by_type(self.entity_type)?;

        let mut report = JanitorReport::default();
        for (entity_id, entity_tags) in tags.group_by_id() {
            if live.contains(&entity_id) {
                continue;
            }
            info!(entity_type = %self.entity_type, entity_id, "Removing orphaned tags");
            for tag in &entity_tags {
                self.store.delete(tag.entity_type, &tag.entity_id, &tag.key)?;
                report.deleted += 1;
            }
            report.orphaned_ids.push(entity_id);
        }

        debug!(
            entity_type = %self.entity_type,
            orphaned = report.orphaned_ids.len(),
            "Finished janitor pass"
        );
        Ok(report)
    }

    /// Runs the janitor every `period` on `runtime`, starting one period from now.
    pub fn run_every(self: Arc<Self>, runtime: &Handle, period: Duration) -> JoinHandle<()> {
        runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let janitor = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || janitor.run()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => error!(error = %err, "Janitor pass failed"),
                    Err(err) => error!(error = %err, "Janitor pass panicked"),
                }
            }
        })
    }
}

pub struct JobJanitor {
    jobs: Arc<dyn JobStore>,
    lifetime: Duration,
}

impl std::fmt::Debug for JobJanitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobJanitor")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl JobJanitor {
    pub fn new(jobs: Arc<dyn JobStore>, lifetime: Duration) -> Self {
        Self { jobs, lifetime }
    }

    /// Deletes jobs older than the lifetime or past their own expiry.
    /// Returns the deleted IDs.
    pub fn run(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let lifetime = chrono::Duration::from_std(self.lifetime)?;
        let mut deleted = Vec::new();
        for job in self.jobs.select_all()? {
            let expired = job.created + lifetime <= now
                || job.time_to_exist.is_some_and(|at| at <= now);
            if !expired {
                continue;
            }
            debug!(job_id = %job.job_id, "Deleting expired job");
            self.jobs.delete(&job.job_id)?;
            deleted.push(job.job_id);
        }
        if !deleted.is_empty() {
            info!(count = deleted.len(), "Deleted expired jobs");
        }
        Ok(deleted)
    }
}
