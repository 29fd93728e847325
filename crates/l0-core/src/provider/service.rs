//! Service provider.

use tracing::{debug, info};

use super::common::{self, CONSISTENCY_DELAY, CONSISTENCY_TIMEOUT, absent, ignore_absent};
use super::{EntityProvider, ProviderContext};
use crate::error::{ProviderError, ProviderResult};
use crate::models::deploy::deploy_id;
use crate::models::{CreateServiceRequest, Deployment, Service, ServiceSummary, UpdateServiceRequest};
use crate::naming;
use crate::remote::{
    CreateServiceInput, EcsService, ErrorSignature, RemoteError, ServiceDeployment,
    ServiceLoadBalancer, ServiceUpdate, TaskDefinition, drain_pages,
};
use crate::retry::{self, with_delay, with_timeout};
use crate::tag::Tag;
use crate::types::EntityType;

/// A service, or the cluster holding it, is already gone.
const SERVICE_GONE: &[ErrorSignature] = &[
    ErrorSignature::Code("ServiceNotFoundException"),
    ErrorSignature::Code("ServiceNotActiveException"),
    ErrorSignature::Code("ClusterNotFoundException"),
];

/// Raised while a freshly created load balancer role is still propagating.
const ROLE_NOT_READY: &str = "Unable to assume role";

/// Maps a task definition ARN back to the deploy ID it was registered as.
pub fn deploy_id_from_task_definition(instance: &str, arn: &str) -> Option<String> {
    let (family, revision) = naming::task_definition_family_revision(arn)?;
    let deploy_name = naming::parse_entity_id(instance, family)?;
    Some(deploy_id(&deploy_name, revision))
}

/// Picks the container and port the load balancer forwards to: the first
/// port mapping that matches a listener's instance port, else the first
/// port mapping at all.
fn load_balancer_target(
    task_definition: &TaskDefinition,
    instance_ports: &[i64],
) -> Option<(String, i64)> {
    let mappings = || {
        task_definition
            .container_definitions
            .iter()
            .flat_map(|c| c.port_mappings.iter().map(move |p| (c.name.clone(), p.container_port)))
    };
    mappings()
        .find(|(_, port)| instance_ports.contains(port))
        .or_else(|| mappings().next())
}

#[derive(Debug, Clone)]
pub struct ServiceProvider {
    context: ProviderContext,
}

impl ServiceProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    pub fn create(&self, req: &CreateServiceRequest) -> ProviderResult<String> {
        req.validate()?;
        let store = self.context.store.as_ref();
        let cloud = &self.context.cloud;

        common::require_tags(store, EntityType::Environment, &req.environment_id)?;
        let deploy_tags = common::require_tags(store, EntityType::Deploy, &req.deploy_id)?;
        let task_definition_arn =
            common::required_value(&deploy_tags, EntityType::Deploy, &req.deploy_id, "arn")?;
        let task_definition = cloud.ecs.describe_task_definition(&task_definition_arn)?;

        let (role, load_balancers) = match &req.load_balancer_id {
            Some(load_balancer_id) => {
                let attachment = self.attach_load_balancer(
                    load_balancer_id,
                    &req.environment_id,
                    &task_definition,
                )?;
                (
                    Some(naming::load_balancer_role_name(
                        self.context.instance(),
                        load_balancer_id,
                    )),
                    vec![attachment],
                )
            }
            None => (None, Vec::new()),
        };

        let service_id = self.context.ids.generate(&req.service_name);
        let input = CreateServiceInput {
            cluster: self.context.fq(&req.environment_id),
            service_name: self.context.fq(&service_id),
            task_definition: task_definition_arn,
            desired_count: req.scale,
            role,
            load_balancers,
        };
        info!(
            service_id = %service_id,
            name = %req.service_name,
            environment_id = %req.environment_id,
            "Creating service"
        );

        retry::retry::<ProviderError, _>(
            || match cloud.ecs.create_service(&input) {
                Ok(_) => Ok(false),
                Err(err) if err.mentions(ROLE_NOT_READY) => {
                    debug!(service_id = %service_id, error = %err, "Load balancer role not ready, will retry");
                    Ok(true)
                }
                Err(err) => Err(err.into()),
            },
            vec![
                with_timeout(CONSISTENCY_TIMEOUT),
                with_delay(CONSISTENCY_DELAY),
            ],
        )
        .map_err(|e| ProviderError::from_retry(&format!("service '{}'", service_id), e))?;

        let mut tags = vec![
            Tag::new(EntityType::Service, &service_id, "name", &req.service_name),
            Tag::new(
                EntityType::Service,
                &service_id,
                "environment_id",
                &req.environment_id,
            ),
        ];
        if let Some(load_balancer_id) = &req.load_balancer_id {
            tags.push(Tag::new(
                EntityType::Service,
                &service_id,
                "load_balancer_id",
                load_balancer_id,
            ));
        }
        common::insert_tags(store, tags)?;

        Ok(service_id)
    }

    fn attach_load_balancer(
        &self,
        load_balancer_id: &str,
        environment_id: &str,
        task_definition: &TaskDefinition,
    ) -> ProviderResult<ServiceLoadBalancer> {
        let tags = common::require_tags(
            self.context.store.as_ref(),
            EntityType::LoadBalancer,
            load_balancer_id,
        )?;
        let load_balancer_environment = common::required_value(
            &tags,
            EntityType::LoadBalancer,
            load_balancer_id,
            "environment_id",
        )?;
        if load_balancer_environment != environment_id {
            return Err(ProviderError::validation(format!(
                "Load balancer '{}' is in environment '{}', not '{}'",
                load_balancer_id, load_balancer_environment, environment_id
            )));
        }

        let fq = self.context.fq(load_balancer_id);
        let description = self
            .context
            .cloud
            .elb
            .describe_load_balancers(std::slice::from_ref(&fq), None)?
            .items
            .into_iter()
            .find(|d| d.name == fq)
            .ok_or_else(|| ProviderError::does_not_exist(EntityType::LoadBalancer, load_balancer_id))?;
        let instance_ports: Vec<i64> = description
            .listeners
            .iter()
            .map(|listener| listener.instance_port)
            .collect();

        let (container_name, container_port) =
            load_balancer_target(task_definition, &instance_ports).ok_or_else(|| {
                ProviderError::validation(
                    "Deploy has no container port mapping to attach to the load balancer",
                )
            })?;

        Ok(ServiceLoadBalancer {
            load_balancer_name: fq,
            container_name,
            container_port,
        })
    }

    pub fn read(&self, service_id: &str) -> ProviderResult<Service> {
        let store = self.context.store.as_ref();
        let tags = common::require_tags(store, EntityType::Service, service_id)?;
        let name = common::required_value(&tags, EntityType::Service, service_id, "name")?;
        let environment_id =
            common::required_value(&tags, EntityType::Service, service_id, "environment_id")?;
        let load_balancer_id = tags.value_of("load_balancer_id").map(str::to_string);

        let service = self.describe(service_id, &environment_id)?;
        let instance = self.context.instance();

        Ok(Service {
            service_id: service_id.to_string(),
            service_name: name,
            environment_name: common::lookup_name(store, EntityType::Environment, &environment_id)?,
            environment_id,
            load_balancer_name: match &load_balancer_id {
                Some(id) => common::lookup_name(store, EntityType::LoadBalancer, id)?,
                None => None,
            },
            load_balancer_id,
            desired_count: service.desired_count,
            running_count: service.running_count,
            pending_count: service.pending_count,
            deployments: service
                .deployments
                .into_iter()
                .map(|d| deployment_model(instance, d))
                .collect(),
        })
    }

    pub fn list(&self) -> ProviderResult<Vec<ServiceSummary>> {
        let store = self.context.store.as_ref();
        let mut summaries = Vec::new();
        for service_id in self.list_ids()? {
            let tags = store.select_by_type_and_id(EntityType::Service, &service_id)?;
            let (Some(name), Some(environment_id)) =
                (tags.value_of("name"), tags.value_of("environment_id"))
            else {
                debug!(service_id = %service_id, "Skipping untagged service");
                continue;
            };
            summaries.push(ServiceSummary {
                service_name: name.to_string(),
                environment_name: common::lookup_name(
                    store,
                    EntityType::Environment,
                    environment_id,
                )?,
                environment_id: environment_id.to_string(),
                service_id,
            });
        }
        Ok(summaries)
    }

    /// Swaps the deploy and/or sets the desired count.
    pub fn update(&self, service_id: &str, req: &UpdateServiceRequest) -> ProviderResult<()> {
        let store = self.context.store.as_ref();
        let environment_id = common::lookup_environment_id(store, EntityType::Service, service_id)?;

        if req.scale.is_some_and(|scale| scale < 0) {
            return Err(ProviderError::validation("Scale cannot be negative"));
        }
        let task_definition = match &req.deploy_id {
            Some(deploy_id) => {
                let tags = common::require_tags(store, EntityType::Deploy, deploy_id)?;
                Some(common::required_value(&tags, EntityType::Deploy, deploy_id, "arn")?)
            }
            None => None,
        };

        let update = ServiceUpdate {
            task_definition,
            desired_count: req.scale,
        };
        if update == ServiceUpdate::default() {
            return Ok(());
        }

        info!(service_id, deploy_id = ?req.deploy_id, scale = ?req.scale, "Updating service");
        self.context.cloud.ecs.update_service(
            &self.context.fq(&environment_id),
            &self.context.fq(service_id),
            &update,
        )?;
        Ok(())
    }

    /// Scales to zero, then deletes. A service without tags is treated as gone.
    pub fn delete(&self, service_id: &str) -> ProviderResult<()> {
        let store = self.context.store.as_ref();
        let tags = store.select_by_type_and_id(EntityType::Service, service_id)?;
        let Some(environment_id) = tags.value_of("environment_id") else {
            debug!(service_id, "Service has no environment tag, nothing to delete remotely");
            common::delete_entity_tags(store, EntityType::Service, service_id)?;
            return Ok(());
        };

        let cluster = self.context.fq(environment_id);
        let service = self.context.fq(service_id);
        info!(service_id, environment_id, "Deleting service");

        ignore_absent(
            self.context.cloud.ecs.update_service(
                &cluster,
                &service,
                &ServiceUpdate {
                    task_definition: None,
                    desired_count: Some(0),
                },
            ),
            SERVICE_GONE,
            "service",
        )?;
        ignore_absent(
            self.context.cloud.ecs.delete_service(&cluster, &service),
            SERVICE_GONE,
            "service",
        )?;

        common::delete_entity_tags(store, EntityType::Service, service_id)?;
        Ok(())
    }

    /// The live remote service.
    pub fn describe(&self, service_id: &str, environment_id: &str) -> ProviderResult<EcsService> {
        let name = self.context.fq(service_id);
        let services = match self
            .context
            .cloud
            .ecs
            .describe_services(&self.context.fq(environment_id), std::slice::from_ref(&name))
        {
            Ok(services) => services,
            Err(err) if err.matches_any(absent::CLUSTER) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        services
            .into_iter()
            .find(|s| s.service_name == name && s.status != "INACTIVE")
            .ok_or_else(|| {
                RemoteError::new(
                    common::DOES_NOT_EXIST,
                    format!("Service '{}' does not exist", name),
                )
                .into()
            })
    }
}

fn deployment_model(instance: &str, deployment: ServiceDeployment) -> Deployment {
    Deployment {
        deploy_id: deploy_id_from_task_definition(instance, &deployment.task_definition),
        deployment_id: deployment.id,
        status: deployment.status,
        desired_count: deployment.desired_count,
        running_count: deployment.running_count,
        pending_count: deployment.pending_count,
        created: deployment.created_at,
        updated: deployment.updated_at,
    }
}

impl EntityProvider for ServiceProvider {
    fn entity_type(&self) -> EntityType {
        EntityType::Service
    }

    fn delete(&self, entity_id: &str) -> ProviderResult<()> {
        ServiceProvider::delete(self, entity_id)
    }

    fn list_ids(&self) -> ProviderResult<Vec<String>> {
        let ecs = self.context.cloud.ecs.as_ref();
        let instance = self.context.instance();
        let mut ids = Vec::new();
        for cluster in common::instance_clusters(ecs, instance)? {
            let arns = drain_pages(|token| ecs.list_services(&cluster, token))?;
            ids.extend(
                arns.iter()
                    .filter_map(|arn| naming::parse_entity_id(instance, naming::name_from_arn(arn))),
            );
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
