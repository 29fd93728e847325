//! One scaling pass over one environment.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::plan::{calculate_scale_down, calculate_scale_up};
use super::resource::{ResourceConsumer, ResourceProvider};
use super::{Scaler, ScalerError, instance_spec};
use crate::error::ProviderError;
use crate::job::{JobStatus, JobStore, JobType};
use crate::models::{CreateTaskRequest, EnvironmentType};
use crate::provider::common;
use crate::provider::{EnvironmentProvider, ProviderContext};
use crate::remote::{AutoScalingGroupSize, TaskDefinition, drain_pages};
use crate::types::EntityType;

/// What a scaling pass decided and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaleReport {
    pub environment_id: String,
    /// `None` when the environment was skipped (dynamic environments).
    pub desired_scale: Option<i64>,
    pub terminated: Vec<String>,
}

pub struct EnvironmentScaler {
    context: ProviderContext,
    environments: Arc<EnvironmentProvider>,
    jobs: Arc<dyn JobStore>,
}

impl std::fmt::Debug for EnvironmentScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentScaler")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl EnvironmentScaler {
    pub fn new(
        context: ProviderContext,
        environments: Arc<EnvironmentProvider>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            context,
            environments,
            jobs,
        }
    }

    /// Gathers providers and consumers, packs them, and resizes the
    /// autoscaling group. Incompatible consumers are reported after the
    /// resize has been applied for everything else.
    pub fn scale(&self, environment_id: &str) -> Result<ScaleReport, ScalerError> {
        let environment = self.environments.read(environment_id)?;
        if environment.environment_type == EnvironmentType::Dynamic {
            debug!(environment_id, "Skipping dynamic environment");
            return Ok(ScaleReport {
                environment_id: environment_id.to_string(),
                ..Default::default()
            });
        }

        let cluster = self.context.fq(environment_id);
        let providers = self.resource_providers(&cluster)?;
        let mut cache = HashMap::new();
        let mut consumers = self.service_consumers(&cluster, &mut cache)?;
        consumers.extend(self.job_task_consumers(environment_id, &mut cache)?);
        debug!(
            environment_id,
            providers = providers.len(),
            consumers = consumers.len(),
            "Gathered environment state"
        );

        let distribution = if consumers.is_empty() {
            super::Distribution {
                providers,
                incompatible: Vec::new(),
            }
        } else {
            let instance_type = environment.instance_type.unwrap_or_default();
            let spec = instance_spec(&instance_type)
                .ok_or_else(|| ScalerError::UnknownInstanceType(instance_type.clone()))?;
            let new_instance = ResourceProvider::new_instance("<new instance>", spec.cpu, spec.memory);
            calculate_scale_up(&providers, &consumers, &new_instance)?
        };

        let unused = calculate_scale_down(&distribution.providers);
        let desired_scale = (distribution.providers.len() - unused.len()) as i64;
        let terminated = self.scale_to_state(environment_id, desired_scale, &unused)?;

        if !distribution.incompatible.is_empty() {
            return Err(ScalerError::IncompatibleConsumer {
                consumer_ids: distribution.incompatible,
            });
        }

        Ok(ScaleReport {
            environment_id: environment_id.to_string(),
            desired_scale: Some(desired_scale),
            terminated,
        })
    }

    /// Sets the group's desired capacity and picks which idle instances go.
    fn scale_to_state(
        &self,
        environment_id: &str,
        desired_scale: i64,
        unused: &[ResourceProvider],
    ) -> Result<Vec<String>, ScalerError> {
        let autoscaling = &self.context.cloud.autoscaling;
        let group = self.environments.read_auto_scaling_group(environment_id)?;
        let current_scale = group.desired_capacity;

        if current_scale != desired_scale {
            info!(
                environment_id,
                current_scale, desired_scale, "Scaling environment"
            );
            let size = AutoScalingGroupSize {
                desired_capacity: Some(desired_scale),
                ..Default::default()
            };
            match autoscaling.update_auto_scaling_group(&group.name, &size) {
                Ok(()) => {}
                Err(err) if err.has_code("ValidationError") => {
                    info!(
                        environment_id,
                        desired_scale,
                        min = group.min_size,
                        max = group.max_size,
                        "Cannot scale environment beyond its bounds"
                    );
                }
                Err(err) => return Err(ProviderError::from(err).into()),
            }
        } else {
            debug!(environment_id, desired_scale, "Environment already at desired scale");
        }

        let mut terminated = Vec::new();
        if desired_scale > group.min_size {
            let removable = usize::try_from(current_scale - desired_scale).unwrap_or(0);
            for provider in unused.iter().take(removable) {
                debug!(environment_id, instance_id = %provider.id, "Terminating unused instance");
                autoscaling
                    .terminate_instance(&provider.id, false)
                    .map_err(ProviderError::from)?;
                terminated.push(provider.id.clone());
            }
        }
        Ok(terminated)
    }

    fn resource_providers(&self, cluster: &str) -> Result<Vec<ResourceProvider>, ScalerError> {
        let ecs = self.context.cloud.ecs.as_ref();
        let arns = drain_pages(|token| ecs.list_container_instances(cluster, token))
            .map_err(ProviderError::from)?;
        if arns.is_empty() {
            return Ok(Vec::new());
        }

        let instances = ecs
            .describe_container_instances(cluster, &arns)
            .map_err(ProviderError::from)?;
        Ok(instances
            .into_iter()
            .map(|instance| ResourceProvider {
                in_use: instance.running_tasks_count + instance.pending_tasks_count > 0,
                id: instance.ec2_instance_id,
                agent_connected: instance.agent_connected,
                status: instance.status,
                available_cpu: instance.remaining_cpu,
                available_memory: instance.remaining_memory,
                used_ports: instance.used_ports,
            })
            .collect())
    }

    /// Service copies the scheduler wants but has not placed yet.
    fn service_consumers(
        &self,
        cluster: &str,
        cache: &mut HashMap<String, Vec<ResourceConsumer>>,
    ) -> Result<Vec<ResourceConsumer>, ScalerError> {
        let ecs = self.context.cloud.ecs.as_ref();
        let arns = drain_pages(|token| ecs.list_services(cluster, token))
            .map_err(ProviderError::from)?;
        if arns.is_empty() {
            return Ok(Vec::new());
        }

        let mut consumers = Vec::new();
        for service in ecs.describe_services(cluster, &arns).map_err(ProviderError::from)? {
            for deployment in &service.deployments {
                let missing =
                    deployment.desired_count - (deployment.running_count + deployment.pending_count);
                for _ in 0..missing.max(0) {
                    consumers.extend(self.consumers_for(&deployment.task_definition, cache)?);
                }
            }
        }
        Ok(consumers)
    }

    /// Containers of in-progress task jobs targeting this environment.
    /// Pending jobs may wait a long time for a worker, so they are ignored.
    fn job_task_consumers(
        &self,
        environment_id: &str,
        cache: &mut HashMap<String, Vec<ResourceConsumer>>,
    ) -> Result<Vec<ResourceConsumer>, ScalerError> {
        let mut consumers = Vec::new();
        for job in self.jobs.select_all()? {
            if job.job_type != JobType::CreateTask || job.status != JobStatus::InProgress {
                continue;
            }
            let req: CreateTaskRequest = match serde_json::from_str(&job.request) {
                Ok(req) => req,
                Err(err) => {
                    warn!(job_id = %job.job_id, error = %err, "Skipping malformed task job");
                    continue;
                }
            };
            if req.environment_id != environment_id {
                continue;
            }

            let tags = common::require_tags(
                self.context.store.as_ref(),
                EntityType::Deploy,
                &req.deploy_id,
            )?;
            let arn = common::required_value(&tags, EntityType::Deploy, &req.deploy_id, "arn")?;
            consumers.extend(self.consumers_for(&arn, cache)?);
        }
        Ok(consumers)
    }

    fn consumers_for(
        &self,
        task_definition: &str,
        cache: &mut HashMap<String, Vec<ResourceConsumer>>,
    ) -> Result<Vec<ResourceConsumer>, ScalerError> {
        if let Some(consumers) = cache.get(task_definition) {
            return Ok(consumers.clone());
        }
        let definition = self
            .context
            .cloud
            .ecs
            .describe_task_definition(task_definition)
            .map_err(ProviderError::from)?;
        let consumers = consumers_from_task_definition(&definition);
        cache.insert(task_definition.to_string(), consumers.clone());
        Ok(consumers)
    }
}

/// One consumer per container. Hard memory limits win over reservations.
pub fn consumers_from_task_definition(definition: &TaskDefinition) -> Vec<ResourceConsumer> {
    definition
        .container_definitions
        .iter()
        .map(|container| {
            let memory = container
                .memory
                .or(container.memory_reservation)
                .unwrap_or(0);
            let ports = container
                .port_mappings
                .iter()
                .map(|mapping| mapping.host_port)
                .filter(|port| *port != 0)
                .collect();
            ResourceConsumer::new(
                format!("{}/{}", definition.arn, container.name),
                container.cpu.unwrap_or(0),
                memory,
                ports,
            )
        })
        .collect()
}

impl Scaler for EnvironmentScaler {
    fn scale(&self, environment_id: &str) -> Result<ScaleReport, ScalerError> {
        EnvironmentScaler::scale(self, environment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ContainerDefinition, PortMapping};

    #[test]
    fn memory_limit_wins_and_dynamic_ports_are_ignored() {
        let definition = TaskDefinition {
            arn: "td:1".into(),
            family: "td".into(),
            revision: 1,
            status: "ACTIVE".into(),
            task_role_arn: None,
            network_mode: None,
            container_definitions: vec![ContainerDefinition {
                name: "web".into(),
                image: "nginx".into(),
                cpu: Some(256),
                memory: Some(512),
                memory_reservation: Some(128),
                port_mappings: vec![
                    PortMapping {
                        host_port: 80,
                        container_port: 80,
                        protocol: None,
                    },
                    PortMapping {
                        host_port: 0,
                        container_port: 8080,
                        protocol: None,
                    },
                ],
                ..Default::default()
            }],
        };
        let consumers = consumers_from_task_definition(&definition);
        assert_eq!(
            consumers,
            vec![ResourceConsumer::new("td:1/web", 256, 512, vec![80])]
        );
    }
}
