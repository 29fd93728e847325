//! Maps each job type onto provider calls.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use super::{Job, JobType, UpdateRequest};
use crate::error::ProviderError;
use crate::models::{
    CreateDeployRequest, CreateEnvironmentRequest, CreateLoadBalancerRequest,
    CreateServiceRequest, CreateTaskRequest, EnvironmentLinkRequest, UpdateEnvironmentRequest,
    UpdateLoadBalancerRequest, UpdateServiceRequest,
};
use crate::provider::Providers;
use crate::scaler::ScaleScheduler;
use crate::tag::TagStore;
use crate::types::EntityType;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("malformed {job_type} request: {source}")]
    Request {
        job_type: JobType,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct JobRunner {
    providers: Providers,
    store: Arc<dyn TagStore>,
    scaler: Arc<dyn ScaleScheduler>,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        providers: Providers,
        store: Arc<dyn TagStore>,
        scaler: Arc<dyn ScaleScheduler>,
    ) -> Self {
        Self {
            providers,
            store,
            scaler,
        }
    }

    /// Runs one job. Creates return the new entity's ID.
    pub fn run(&self, job: &Job) -> Result<Option<String>, JobError> {
        debug!(job_id = %job.job_id, job_type = %job.job_type, "Running job");
        let p = &self.providers;
        let request = job.request.as_str();

        match job.job_type {
            JobType::CreateDeploy => {
                let req: CreateDeployRequest = decode(job)?;
                Ok(Some(p.deploy.create(&req)?))
            }
            JobType::CreateEnvironment => {
                let req: CreateEnvironmentRequest = decode(job)?;
                Ok(Some(p.environment.create(&req)?))
            }
            JobType::CreateEnvironmentLink => {
                let req: EnvironmentLinkRequest = decode(job)?;
                p.environment
                    .link(&req.source_environment_id, &req.dest_environment_id)?;
                Ok(None)
            }
            JobType::CreateLoadBalancer => {
                let req: CreateLoadBalancerRequest = decode(job)?;
                Ok(Some(p.load_balancer.create(&req)?))
            }
            JobType::CreateService => {
                let req: CreateServiceRequest = decode(job)?;
                let service_id = p.service.create(&req)?;
                // the service is in the scheduler now, so its copies count
                self.scaler.schedule_run(&req.environment_id);
                Ok(Some(service_id))
            }
            JobType::CreateTask => {
                let req: CreateTaskRequest = decode(job)?;
                // make room before the task is placed
                self.scaler.schedule_run(&req.environment_id);
                Ok(Some(p.task.create(&req)?))
            }
            JobType::DeleteDeploy => {
                p.deploy.delete(request)?;
                Ok(None)
            }
            JobType::DeleteEnvironment => {
                self.delete_environment(request)?;
                Ok(None)
            }
            JobType::DeleteEnvironmentLink => {
                let req: EnvironmentLinkRequest = decode(job)?;
                p.environment
                    .unlink(&req.source_environment_id, &req.dest_environment_id)?;
                Ok(None)
            }
            JobType::DeleteLoadBalancer => {
                p.load_balancer.delete(request)?;
                Ok(None)
            }
            JobType::DeleteService => {
                let environment_id = self.environment_of(EntityType::Service, request)?;
                p.service.delete(request)?;
                if let Some(environment_id) = environment_id {
                    self.scaler.schedule_run(&environment_id);
                }
                Ok(None)
            }
            JobType::DeleteTask => {
                let environment_id = self.environment_of(EntityType::Task, request)?;
                p.task.delete(request)?;
                if let Some(environment_id) = environment_id {
                    self.scaler.schedule_run(&environment_id);
                }
                Ok(None)
            }
            JobType::UpdateEnvironment => {
                let req: UpdateRequest<UpdateEnvironmentRequest> = decode(job)?;
                p.environment.update(&req.entity_id, &req.update)?;
                Ok(None)
            }
            JobType::UpdateLoadBalancer => {
                let req: UpdateRequest<UpdateLoadBalancerRequest> = decode(job)?;
                p.load_balancer.update(&req.entity_id, &req.update)?;
                Ok(None)
            }
            JobType::UpdateService => {
                let req: UpdateRequest<UpdateServiceRequest> = decode(job)?;
                p.service.update(&req.entity_id, &req.update)?;
                if let Some(environment_id) = self.environment_of(EntityType::Service, &req.entity_id)? {
                    self.scaler.schedule_run(&environment_id);
                }
                Ok(None)
            }
        }
    }

    /// Deletes everything living in the environment, then the environment.
    fn delete_environment(&self, environment_id: &str) -> Result<(), ProviderError> {
        let p = &self.providers;
        for (entity_type, provider) in [
            (EntityType::Service, p.for_type(EntityType::Service)),
            (EntityType::Task, p.for_type(EntityType::Task)),
            (EntityType::LoadBalancer, p.for_type(EntityType::LoadBalancer)),
        ] {
            let Some(provider) = provider else { continue };
            let ids = self
                .store
                .select_by_type(entity_type)?
                .with_key("environment_id")
                .with_value(environment_id)
                .entity_ids();
            for id in ids {
                info!(environment_id, entity_type = %entity_type, entity_id = %id, "Deleting environment member");
                provider.delete(&id)?;
            }
        }
        p.environment.delete(environment_id)
    }

    fn environment_of(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let tags = self.store.select_by_type_and_id(entity_type, entity_id)?;
        Ok(tags.value_of("environment_id").map(str::to_string))
    }
}

fn decode<T: DeserializeOwned>(job: &Job) -> Result<T, JobError> {
    serde_json::from_str(&job.request).map_err(|source| JobError::Request {
        job_type: job.job_type,
        source,
    })
}
