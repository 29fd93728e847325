//! Bootstrap for a fresh instance.
//!
//! The control plane runs inside its own instance as the `api` environment,
//! load balancer and service. Those resources are provisioned outside this
//! crate, so `init` only has to record their tags.

use tracing::{info, warn};

use super::ProviderContext;
use super::common;
use super::service::deploy_id_from_task_definition;
use crate::error::ProviderResult;
use crate::models::deploy::split_deploy_id;
use crate::models::{CLASSIC_LOAD_BALANCER_TYPE, EnvironmentType, OperatingSystem};
use crate::tag::Tag;
use crate::types::EntityType;

/// Entity ID shared by the `api` environment, load balancer and service.
pub const API_ENTITY_ID: &str = "api";

#[derive(Debug, Clone)]
pub struct AdminProvider {
    context: ProviderContext,
}

impl AdminProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    /// Prepares the tag store and records the `api` entities. Safe to re-run.
    pub fn init(&self) -> ProviderResult<()> {
        let store = self.context.store.as_ref();
        store.init()?;
        info!(instance = %self.context.instance(), "Initializing instance");

        let mut tags = vec![
            Tag::new(EntityType::Environment, API_ENTITY_ID, "name", API_ENTITY_ID),
            Tag::new(
                EntityType::Environment,
                API_ENTITY_ID,
                "os",
                OperatingSystem::Linux.as_str(),
            ),
            Tag::new(
                EntityType::Environment,
                API_ENTITY_ID,
                "type",
                EnvironmentType::Static.as_str(),
            ),
            Tag::new(EntityType::LoadBalancer, API_ENTITY_ID, "name", API_ENTITY_ID),
            Tag::new(
                EntityType::LoadBalancer,
                API_ENTITY_ID,
                "environment_id",
                API_ENTITY_ID,
            ),
            Tag::new(
                EntityType::LoadBalancer,
                API_ENTITY_ID,
                "type",
                CLASSIC_LOAD_BALANCER_TYPE,
            ),
            Tag::new(EntityType::Service, API_ENTITY_ID, "name", API_ENTITY_ID),
            Tag::new(
                EntityType::Service,
                API_ENTITY_ID,
                "environment_id",
                API_ENTITY_ID,
            ),
            Tag::new(
                EntityType::Service,
                API_ENTITY_ID,
                "load_balancer_id",
                API_ENTITY_ID,
            ),
        ];
        tags.extend(self.api_deploy_tags()?);

        common::insert_tags(store, tags)
    }

    /// Tags for the deploy the `api` service currently runs, if it exists yet.
    fn api_deploy_tags(&self) -> ProviderResult<Vec<Tag>> {
        let fq = self.context.fq(API_ENTITY_ID);
        let services = match self
            .context
            .cloud
            .ecs
            .describe_services(&fq, std::slice::from_ref(&fq))
        {
            Ok(services) => services,
            Err(err) if err.matches_any(common::absent::CLUSTER) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let Some(service) = services.into_iter().find(|s| s.service_name == fq) else {
            warn!(service = %fq, "api service not found, skipping deploy tags");
            return Ok(Vec::new());
        };
        let Some(deploy_id) =
            deploy_id_from_task_definition(self.context.instance(), &service.task_definition)
        else {
            warn!(task_definition = %service.task_definition, "api task definition is not owned by this instance");
            return Ok(Vec::new());
        };
        let Some((name, version)) = split_deploy_id(&deploy_id) else {
            return Ok(Vec::new());
        };

        Ok(vec![
            Tag::new(EntityType::Deploy, &deploy_id, "name", name),
            Tag::new(EntityType::Deploy, &deploy_id, "version", version),
            Tag::new(EntityType::Deploy, &deploy_id, "arn", &service.task_definition),
        ])
    }
}
