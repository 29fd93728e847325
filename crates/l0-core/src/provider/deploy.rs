//! Deploy provider.
//!
//! A deploy is one revision of the task definition family
//! `l0-<instance>-<deploy_name>`. Its ID is `<deploy_name>.<revision>`, so
//! unlike other entities the ID is assigned by the remote registry.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::common::{self, absent, ignore_absent};
use super::{EntityProvider, ProviderContext};
use crate::error::{ProviderError, ProviderResult};
use crate::models::deploy::{deploy_id, split_deploy_id};
use crate::models::{CreateDeployRequest, Deploy, DeploySummary, Dockerrun};
use crate::naming;
use crate::remote::{
    ContainerDefinition, LogConfiguration, RegisterTaskDefinitionInput, TaskDefinition,
    drain_pages,
};
use crate::tag::Tag;
use crate::types::EntityType;

/// Stream prefix for the default log configuration.
pub const LOG_STREAM_PREFIX: &str = "l0";

#[derive(Debug, Clone)]
pub struct DeployProvider {
    context: ProviderContext,
}

impl DeployProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    /// Registers a new revision and returns its deploy ID.
    pub fn create(&self, req: &CreateDeployRequest) -> ProviderResult<String> {
        req.validate()?;
        let family = self.context.fq(&req.deploy_name);

        let container_definitions = req
            .dockerrun
            .container_definitions
            .iter()
            .cloned()
            .map(|definition| self.with_default_logging(definition))
            .collect();

        info!(deploy_name = %req.deploy_name, family = %family, "Registering task definition");
        let task_definition =
            self.context
                .cloud
                .ecs
                .register_task_definition(&RegisterTaskDefinitionInput {
                    family,
                    task_role_arn: req.dockerrun.task_role_arn.clone(),
                    network_mode: req.dockerrun.network_mode.clone(),
                    container_definitions,
                })?;

        let version = task_definition.revision.to_string();
        let id = deploy_id(&req.deploy_name, &version);
        common::insert_tags(
            self.context.store.as_ref(),
            vec![
                Tag::new(EntityType::Deploy, &id, "name", &req.deploy_name),
                Tag::new(EntityType::Deploy, &id, "version", &version),
                Tag::new(EntityType::Deploy, &id, "arn", &task_definition.arn),
            ],
        )?;

        debug!(deploy_id = %id, arn = %task_definition.arn, "Deploy created");
        Ok(id)
    }

    pub fn read(&self, deploy_id: &str) -> ProviderResult<Deploy> {
        let tags = common::require_tags(self.context.store.as_ref(), EntityType::Deploy, deploy_id)?;
        let name = common::required_value(&tags, EntityType::Deploy, deploy_id, "name")?;
        let version = common::required_value(&tags, EntityType::Deploy, deploy_id, "version")?;
        let arn = common::required_value(&tags, EntityType::Deploy, deploy_id, "arn")?;

        let task_definition = self.describe(deploy_id, &arn)?;
        Ok(Deploy {
            deploy_id: deploy_id.to_string(),
            deploy_name: name,
            version,
            dockerrun: Dockerrun {
                container_definitions: task_definition.container_definitions,
                family: None,
                task_role_arn: task_definition.task_role_arn,
                network_mode: task_definition.network_mode,
            },
        })
    }

    pub fn list(&self) -> ProviderResult<Vec<DeploySummary>> {
        Ok(self
            .list_ids()?
            .into_iter()
            .filter_map(|id| {
                let (name, version) = split_deploy_id(&id)?;
                Some(DeploySummary {
                    deploy_name: name.to_string(),
                    version: version.to_string(),
                    deploy_id: id.clone(),
                })
            })
            .collect())
    }

    /// Deregisters the revision. Unknown or already inactive revisions succeed.
    pub fn delete(&self, deploy_id: &str) -> ProviderResult<()> {
        let store = self.context.store.as_ref();
        let tags = store.select_by_type_and_id(EntityType::Deploy, deploy_id)?;
        let arn = match tags.value_of("arn") {
            Some(arn) => Some(arn.to_string()),
            None => split_deploy_id(deploy_id)
                .map(|(name, version)| format!("{}:{}", self.context.fq(name), version)),
        };

        if let Some(arn) = arn {
            info!(deploy_id, arn = %arn, "Deregistering task definition");
            ignore_absent(
                self.context.cloud.ecs.deregister_task_definition(&arn),
                absent::TASK_DEFINITION,
                "task definition",
            )?;
        }

        common::delete_entity_tags(store, EntityType::Deploy, deploy_id)?;
        Ok(())
    }

    /// The remote task definition behind a deploy.
    pub fn describe(&self, deploy_id: &str, arn: &str) -> ProviderResult<TaskDefinition> {
        match self.context.cloud.ecs.describe_task_definition(arn) {
            Ok(task_definition) => Ok(task_definition),
            Err(err) if err.matches_any(absent::TASK_DEFINITION) => {
                Err(ProviderError::does_not_exist(EntityType::Deploy, deploy_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn with_default_logging(&self, mut definition: ContainerDefinition) -> ContainerDefinition {
        if definition.log_configuration.is_none() {
            let config = &self.context.config;
            definition.log_configuration = Some(LogConfiguration {
                log_driver: "awslogs".to_string(),
                options: BTreeMap::from([
                    ("awslogs-group".to_string(), config.log_group_name().to_string()),
                    ("awslogs-region".to_string(), config.region().to_string()),
                    (
                        "awslogs-stream-prefix".to_string(),
                        LOG_STREAM_PREFIX.to_string(),
                    ),
                ]),
            });
        }
        definition
    }
}

impl EntityProvider for DeployProvider {
    fn entity_type(&self) -> EntityType {
        EntityType::Deploy
    }

    fn delete(&self, entity_id: &str) -> ProviderResult<()> {
        DeployProvider::delete(self, entity_id)
    }

    /// Every active revision of every family owned by this instance.
    fn list_ids(&self) -> ProviderResult<Vec<String>> {
        let ecs = self.context.cloud.ecs.as_ref();
        let instance = self.context.instance();
        let prefix = naming::instance_prefix(instance);

        let families =
            drain_pages(|token| ecs.list_task_definition_families(&prefix, token))?;
        let mut ids = Vec::new();
        for family in families {
            let Some(deploy_name) = naming::parse_entity_id(instance, &family) else {
                continue;
            };
            let arns = drain_pages(|token| ecs.list_task_definitions(&family, token))?;
            ids.extend(arns.iter().filter_map(|arn| {
                naming::task_definition_family_revision(arn)
                    .map(|(_, revision)| deploy_id(&deploy_name, revision))
            }));
        }
        ids.sort();
        Ok(ids)
    }
}
