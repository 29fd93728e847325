//! Picks up a job, runs it, and records the outcome.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use super::{JobRunner, JobStatus, JobStore};

/// Result of [`Worker::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Another worker already owns the job.
    Skipped,
    Completed { result: Option<String> },
    Failed { error: String },
}

pub struct Worker {
    jobs: Arc<dyn JobStore>,
    runner: Arc<JobRunner>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(jobs: Arc<dyn JobStore>, runner: Arc<JobRunner>) -> Self {
        Self { jobs, runner }
    }

    /// Runs one job to completion. Store failures are returned; job failures
    /// are recorded on the job.
    pub fn process(&self, job_id: &str) -> Result<JobOutcome> {
        if !self.jobs.acquire(job_id)? {
            info!(job_id, "Job already acquired");
            return Ok(JobOutcome::Skipped);
        }

        let job = self.jobs.select_by_id(job_id)?;
        info!(job_id, job_type = %job.job_type, "Starting job");

        match self.runner.run(&job) {
            Ok(result) => {
                if let Some(result) = &result {
                    self.jobs.set_result(job_id, result)?;
                }
                self.jobs.set_status(job_id, JobStatus::Completed)?;
                info!(job_id, "Finished job");
                Ok(JobOutcome::Completed { result })
            }
            Err(err) => {
                error!(job_id, error = %err, "Job failed");
                let message = err.to_string();
                self.jobs.set_error(job_id, &message)?;
                self.jobs.set_status(job_id, JobStatus::Error)?;
                Ok(JobOutcome::Failed { error: message })
            }
        }
    }

    /// Processes every pending job in creation order.
    pub fn drain(&self) -> Result<Vec<(String, JobOutcome)>> {
        let pending: Vec<String> = self
            .jobs
            .select_all()?
            .into_iter()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| job.job_id)
            .collect();

        pending
            .into_iter()
            .map(|job_id| {
                let outcome = self.process(&job_id)?;
                Ok((job_id, outcome))
            })
            .collect()
    }
}
