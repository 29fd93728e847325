//! Asynchronous jobs wrapping long-running provider operations.
//!
//! A job records one provider call (its type plus a JSON request) so that a
//! worker can run it later and callers can poll for the outcome.

pub mod runner;
pub mod store;
pub mod worker;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use runner::{JobError, JobRunner};
pub use store::{JobStore, MemoryJobStore};
pub use worker::{JobOutcome, Worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job does. The request payload shape depends on the type:
/// creates carry the create request, deletes carry the bare entity ID,
/// updates carry an [`UpdateRequest`], link jobs an `EnvironmentLinkRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CreateDeploy,
    CreateEnvironment,
    CreateEnvironmentLink,
    CreateLoadBalancer,
    CreateService,
    CreateTask,
    DeleteDeploy,
    DeleteEnvironment,
    DeleteEnvironmentLink,
    DeleteLoadBalancer,
    DeleteService,
    DeleteTask,
    UpdateEnvironment,
    UpdateLoadBalancer,
    UpdateService,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CreateDeploy => "create_deploy",
            JobType::CreateEnvironment => "create_environment",
            JobType::CreateEnvironmentLink => "create_environment_link",
            JobType::CreateLoadBalancer => "create_load_balancer",
            JobType::CreateService => "create_service",
            JobType::CreateTask => "create_task",
            JobType::DeleteDeploy => "delete_deploy",
            JobType::DeleteEnvironment => "delete_environment",
            JobType::DeleteEnvironmentLink => "delete_environment_link",
            JobType::DeleteLoadBalancer => "delete_load_balancer",
            JobType::DeleteService => "delete_service",
            JobType::DeleteTask => "delete_task",
            JobType::UpdateEnvironment => "update_environment",
            JobType::UpdateLoadBalancer => "update_load_balancer",
            JobType::UpdateService => "update_service",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of update jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest<T> {
    pub entity_id: String,
    pub update: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    /// JSON request, shaped per [`JobType`].
    pub request: String,
    /// ID of the entity a finished create produced.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created: DateTime<Utc>,
    /// Explicit expiry, checked by the job janitor alongside the lifetime.
    #[serde(default)]
    pub time_to_exist: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, job_type: JobType, request: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job_type,
            status: JobStatus::Pending,
            request: request.into(),
            result: None,
            error: None,
            created: Utc::now(),
            time_to_exist: None,
        }
    }
}
