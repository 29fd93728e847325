#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use l0_core::config::L0Config;
use l0_core::id::SequenceIdGenerator;
use l0_core::provider::{ProviderContext, Providers};
use l0_core::remote::{
    AutoScalingApi, AutoScalingGroup, AutoScalingGroupSize, CloudClients, Container,
    ContainerInstance, CreateLoadBalancerInput, CreateServiceInput, DescribeTasksOutput,
    DesiredStatus, Ec2Api, EcsApi, EcsService, EcsTask, ElbApi, ElbHealthCheck, Failure, IamApi,
    IngressRule, LaunchConfiguration, Listener, LoadBalancerDescription, Page,
    RegisterTaskDefinitionInput, RemoteError, RemoteResult, RunTaskInput, SecurityGroup,
    ServerCertificate, ServiceDeployment, ServiceUpdate, TaskDefinition,
};
use l0_core::tag::{MemoryTagStore, TagStore};

pub const INSTANCE: &str = "test";
pub const ACCOUNT_ID: &str = "123456789012";
pub const REGION: &str = "us-west-2";

fn arn(resource: &str) -> String {
    format!("arn:aws:ecs:{}:{}:{}", REGION, ACCOUNT_ID, resource)
}

/// `family:revision` from an ARN or short reference.
fn parse_task_definition(reference: &str) -> Option<(String, i64)> {
    let short = l0_core::naming::name_from_arn(reference);
    let (family, revision) = short.rsplit_once(':')?;
    Some((family.to_string(), revision.parse().ok()?))
}

#[derive(Default)]
struct State {
    next_id: u64,
    security_groups: BTreeMap<String, SecurityGroup>,
    launch_configurations: BTreeMap<String, LaunchConfiguration>,
    auto_scaling_groups: BTreeMap<String, AutoScalingGroup>,
    clusters: Vec<String>,
    task_definitions: BTreeMap<String, Vec<TaskDefinition>>,
    services: Vec<EcsService>,
    tasks: Vec<EcsTask>,
    container_instances: BTreeMap<String, Vec<ContainerInstance>>,
    load_balancers: BTreeMap<String, LoadBalancerDescription>,
    roles: BTreeMap<String, Vec<String>>,
    certificates: Vec<ServerCertificate>,
    terminated: Vec<(String, bool)>,
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<RemoteError>>,
}

impl State {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn group_by_id(&mut self, group_id: &str) -> RemoteResult<&mut SecurityGroup> {
        self.security_groups
            .values_mut()
            .find(|g| g.group_id == group_id)
            .ok_or_else(|| {
                RemoteError::new(
                    "InvalidGroup.NotFound",
                    format!("The security group '{}' does not exist", group_id),
                )
            })
    }

    fn require_cluster(&self, cluster: &str) -> RemoteResult<()> {
        if self.clusters.iter().any(|c| c == cluster) {
            Ok(())
        } else {
            Err(RemoteError::new("ClusterNotFoundException", "Cluster not found."))
        }
    }

    fn find_task_definition(&self, reference: &str) -> Option<&TaskDefinition> {
        let (family, revision) = parse_task_definition(reference)?;
        self.task_definitions
            .get(&family)?
            .iter()
            .find(|td| td.revision == revision)
    }
}

/// In-memory stand-in for every remote API, with a call log and one-shot
/// failure injection per operation.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Records the call and pops an injected failure for `op`, if any.
    fn enter(&self, op: &str) -> RemoteResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(op.to_string());
        if let Some(err) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }

    pub fn clients(self: &Arc<Self>) -> CloudClients {
        CloudClients {
            ec2: self.clone(),
            autoscaling: self.clone(),
            ecs: self.clone(),
            elb: self.clone(),
            iam: self.clone(),
        }
    }

    pub fn fail_next(&self, op: &str, err: RemoteError) {
        self.state()
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == op).count()
    }

    pub fn security_group(&self, name: &str) -> Option<SecurityGroup> {
        self.state().security_groups.get(name).cloned()
    }

    pub fn auto_scaling_group(&self, name: &str) -> Option<AutoScalingGroup> {
        self.state().auto_scaling_groups.get(name).cloned()
    }

    pub fn launch_configuration(&self, name: &str) -> Option<LaunchConfiguration> {
        self.state().launch_configurations.get(name).cloned()
    }

    pub fn has_cluster(&self, name: &str) -> bool {
        self.state().clusters.iter().any(|c| c == name)
    }

    pub fn load_balancer(&self, name: &str) -> Option<LoadBalancerDescription> {
        self.state().load_balancers.get(name).cloned()
    }

    pub fn role_policies(&self, role: &str) -> Option<Vec<String>> {
        self.state().roles.get(role).cloned()
    }

    pub fn service(&self, cluster: &str, name: &str) -> Option<EcsService> {
        self.state()
            .services
            .iter()
            .find(|s| s.cluster == cluster && s.service_name == name)
            .cloned()
    }

    pub fn task(&self, arn: &str) -> Option<EcsTask> {
        self.state().tasks.iter().find(|t| t.task_arn == arn).cloned()
    }

    pub fn terminated(&self) -> Vec<(String, bool)> {
        self.state().terminated.clone()
    }

    pub fn add_certificate(&self, name: &str, arn: &str) {
        self.state().certificates.push(ServerCertificate {
            name: name.to_string(),
            arn: arn.to_string(),
        });
    }

    pub fn add_container_instance(&self, cluster: &str, instance: ContainerInstance) {
        self.state()
            .container_instances
            .entry(cluster.to_string())
            .or_default()
            .push(instance);
    }

    /// Adjusts the counts of a service's primary deployment.
    pub fn set_service_counts(&self, cluster: &str, name: &str, running: i64, pending: i64) {
        let mut state = self.state();
        if let Some(service) = state
            .services
            .iter_mut()
            .find(|s| s.cluster == cluster && s.service_name == name)
        {
            service.running_count = running;
            service.pending_count = pending;
            for deployment in &mut service.deployments {
                deployment.running_count = running;
                deployment.pending_count = pending;
            }
        }
    }

    /// Removes a task behind the control plane's back.
    pub fn forget_task(&self, arn: &str) {
        self.state().tasks.retain(|t| t.task_arn != arn);
    }
}

pub fn container_instance(id: &str, cpu: i64, memory: i64, running: i64) -> ContainerInstance {
    ContainerInstance {
        arn: arn(&format!("container-instance/{}", id)),
        ec2_instance_id: id.to_string(),
        agent_connected: true,
        status: "ACTIVE".to_string(),
        remaining_cpu: cpu,
        remaining_memory: memory,
        used_ports: vec![22, 2376, 2375, 51678, 51679],
        running_tasks_count: running,
        pending_tasks_count: 0,
    }
}

impl Ec2Api for FakeCloud {
    fn create_security_group(
        &self,
        name: &str,
        _description: &str,
        vpc_id: &str,
    ) -> RemoteResult<String> {
        let mut state = self.enter("create_security_group")?;
        if state.security_groups.contains_key(name) {
            return Err(RemoteError::new(
                "InvalidGroup.Duplicate",
                format!("The security group '{}' already exists", name),
            ));
        }
        let group_id = format!("sg-{}", state.next());
        state.security_groups.insert(
            name.to_string(),
            SecurityGroup {
                group_id: group_id.clone(),
                group_name: name.to_string(),
                vpc_id: vpc_id.to_string(),
                ingress: Vec::new(),
            },
        );
        Ok(group_id)
    }

    fn describe_security_groups_by_name(&self, name: &str) -> RemoteResult<Vec<SecurityGroup>> {
        let state = self.enter("describe_security_groups")?;
        Ok(state.security_groups.get(name).cloned().into_iter().collect())
    }

    fn delete_security_group(&self, group_id: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_security_group")?;
        state.group_by_id(group_id)?;
        state.security_groups.retain(|_, g| g.group_id != group_id);
        Ok(())
    }

    fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> RemoteResult<()> {
        let mut state = self.enter("authorize_ingress")?;
        let group = state.group_by_id(group_id)?;
        if group.ingress.contains(rule) {
            return Err(RemoteError::new(
                "InvalidPermission.Duplicate",
                "the specified rule already exists",
            ));
        }
        group.ingress.push(rule.clone());
        Ok(())
    }

    fn revoke_ingress(&self, group_id: &str, rule: &IngressRule) -> RemoteResult<()> {
        let mut state = self.enter("revoke_ingress")?;
        let group = state.group_by_id(group_id)?;
        let before = group.ingress.len();
        group.ingress.retain(|r| r != rule);
        if group.ingress.len() == before {
            return Err(RemoteError::new(
                "InvalidPermission.NotFound",
                "the specified rule does not exist",
            ));
        }
        Ok(())
    }
}

impl AutoScalingApi for FakeCloud {
    fn create_launch_configuration(&self, config: &LaunchConfiguration) -> RemoteResult<()> {
        let mut state = self.enter("create_launch_configuration")?;
        state
            .launch_configurations
            .insert(config.name.clone(), config.clone());
        Ok(())
    }

    fn describe_launch_configurations(
        &self,
        name: &str,
    ) -> RemoteResult<Vec<LaunchConfiguration>> {
        let state = self.enter("describe_launch_configurations")?;
        Ok(state
            .launch_configurations
            .get(name)
            .cloned()
            .into_iter()
            .collect())
    }

    fn delete_launch_configuration(&self, name: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_launch_configuration")?;
        state.launch_configurations.remove(name).map(|_| ()).ok_or_else(|| {
            RemoteError::new(
                "ValidationError",
                format!("Launch configuration name not found - {}", name),
            )
        })
    }

    fn create_auto_scaling_group(&self, group: &AutoScalingGroup) -> RemoteResult<()> {
        let mut state = self.enter("create_auto_scaling_group")?;
        state
            .auto_scaling_groups
            .insert(group.name.clone(), group.clone());
        Ok(())
    }

    fn describe_auto_scaling_groups(&self, name: &str) -> RemoteResult<Vec<AutoScalingGroup>> {
        let state = self.enter("describe_auto_scaling_groups")?;
        Ok(state
            .auto_scaling_groups
            .get(name)
            .cloned()
            .into_iter()
            .collect())
    }

    fn update_auto_scaling_group(
        &self,
        name: &str,
        size: &AutoScalingGroupSize,
    ) -> RemoteResult<()> {
        let mut state = self.enter("update_auto_scaling_group")?;
        let group = state.auto_scaling_groups.get_mut(name).ok_or_else(|| {
            RemoteError::new(
                "ValidationError",
                format!("AutoScalingGroup name not found - {}", name),
            )
        })?;
        let min = size.min_size.unwrap_or(group.min_size);
        let max = size.max_size.unwrap_or(group.max_size);
        let desired = size.desired_capacity.unwrap_or(group.desired_capacity);
        if desired < min || desired > max {
            return Err(RemoteError::new(
                "ValidationError",
                format!(
                    "New SetDesiredCapacity value {} is outside the bounds [{}, {}]",
                    desired, min, max
                ),
            ));
        }
        group.min_size = min;
        group.max_size = max;
        group.desired_capacity = desired;
        Ok(())
    }

    fn delete_auto_scaling_group(&self, name: &str, _force: bool) -> RemoteResult<()> {
        let mut state = self.enter("delete_auto_scaling_group")?;
        state.auto_scaling_groups.remove(name).map(|_| ()).ok_or_else(|| {
            RemoteError::new(
                "ValidationError",
                format!("AutoScalingGroup name not found - {}", name),
            )
        })
    }

    fn terminate_instance(&self, instance_id: &str, decrement_capacity: bool) -> RemoteResult<()> {
        let mut state = self.enter("terminate_instance")?;
        state
            .terminated
            .push((instance_id.to_string(), decrement_capacity));
        Ok(())
    }
}

impl EcsApi for FakeCloud {
    fn create_cluster(&self, name: &str) -> RemoteResult<()> {
        let mut state = self.enter("create_cluster")?;
        if !state.clusters.iter().any(|c| c == name) {
            state.clusters.push(name.to_string());
        }
        Ok(())
    }

    fn delete_cluster(&self, name: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_cluster")?;
        state.require_cluster(name)?;
        state.clusters.retain(|c| c != name);
        Ok(())
    }

    fn list_clusters(&self, _next_token: Option<String>) -> RemoteResult<Page<String>> {
        let state = self.enter("list_clusters")?;
        Ok(Page::last(
            state
                .clusters
                .iter()
                .map(|c| arn(&format!("cluster/{}", c)))
                .collect(),
        ))
    }

    fn register_task_definition(
        &self,
        input: &RegisterTaskDefinitionInput,
    ) -> RemoteResult<TaskDefinition> {
        let mut state = self.enter("register_task_definition")?;
        let revisions = state
            .task_definitions
            .entry(input.family.clone())
            .or_default();
        let revision = revisions.len() as i64 + 1;
        let definition = TaskDefinition {
            arn: arn(&format!("task-definition/{}:{}", input.family, revision)),
            family: input.family.clone(),
            revision,
            status: "ACTIVE".to_string(),
            task_role_arn: input.task_role_arn.clone(),
            network_mode: input.network_mode.clone(),
            container_definitions: input.container_definitions.clone(),
        };
        revisions.push(definition.clone());
        Ok(definition)
    }

    fn describe_task_definition(&self, task_definition: &str) -> RemoteResult<TaskDefinition> {
        let state = self.enter("describe_task_definition")?;
        state
            .find_task_definition(task_definition)
            .cloned()
            .ok_or_else(|| {
                RemoteError::new("ClientException", "Unable to describe task definition.")
            })
    }

    fn deregister_task_definition(&self, task_definition: &str) -> RemoteResult<()> {
        let mut state = self.enter("deregister_task_definition")?;
        let found = match parse_task_definition(task_definition) {
            Some((family, revision)) => state
                .task_definitions
                .get_mut(&family)
                .and_then(|revisions| {
                    revisions
                        .iter_mut()
                        .find(|td| td.revision == revision && td.status == "ACTIVE")
                }),
            None => None,
        };
        match found {
            Some(definition) => {
                definition.status = "INACTIVE".to_string();
                Ok(())
            }
            None => Err(RemoteError::new(
                "ClientException",
                "Unable to describe task definition.",
            )),
        }
    }

    fn list_task_definition_families(
        &self,
        family_prefix: &str,
        _next_token: Option<String>,
    ) -> RemoteResult<Page<String>> {
        let state = self.enter("list_task_definition_families")?;
        Ok(Page::last(
            state
                .task_definitions
                .iter()
                .filter(|(family, revisions)| {
                    family.starts_with(family_prefix)
                        && revisions.iter().any(|td| td.status == "ACTIVE")
                })
                .map(|(family, _)| family.clone())
                .collect(),
        ))
    }

    fn list_task_definitions(
        &self,
        family: &str,
        _next_token: Option<String>,
    ) -> RemoteResult<Page<String>> {
        let state = self.enter("list_task_definitions")?;
        Ok(Page::last(
            state
                .task_definitions
                .get(family)
                .into_iter()
                .flatten()
                .filter(|td| td.status == "ACTIVE")
                .map(|td| td.arn.clone())
                .collect(),
        ))
    }

    fn create_service(&self, input: &CreateServiceInput) -> RemoteResult<EcsService> {
        let mut state = self.enter("create_service")?;
        state.require_cluster(&input.cluster)?;
        let now = Utc::now();
        let id = state.next();
        let service = EcsService {
            service_name: input.service_name.clone(),
            cluster: input.cluster.clone(),
            status: "ACTIVE".to_string(),
            task_definition: input.task_definition.clone(),
            desired_count: input.desired_count,
            running_count: 0,
            pending_count: 0,
            deployments: vec![ServiceDeployment {
                id: format!("ecs-svc/{}", id),
                status: "PRIMARY".to_string(),
                task_definition: input.task_definition.clone(),
                desired_count: input.desired_count,
                running_count: 0,
                pending_count: 0,
                created_at: now,
                updated_at: now,
            }],
            load_balancers: input.load_balancers.clone(),
        };
        state.services.push(service.clone());
        Ok(service)
    }

    fn describe_services(
        &self,
        cluster: &str,
        services: &[String],
    ) -> RemoteResult<Vec<EcsService>> {
        let state = self.enter("describe_services")?;
        state.require_cluster(cluster)?;
        Ok(state
            .services
            .iter()
            .filter(|s| s.cluster == cluster)
            .filter(|s| {
                services.iter().any(|wanted| {
                    *wanted == s.service_name
                        || l0_core::naming::name_from_arn(wanted) == s.service_name
                })
            })
            .cloned()
            .collect())
    }

    fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: &ServiceUpdate,
    ) -> RemoteResult<()> {
        let mut state = self.enter("update_service")?;
        state.require_cluster(cluster)?;
        let found = state
            .services
            .iter_mut()
            .find(|s| s.cluster == cluster && s.service_name == service)
            .ok_or_else(|| RemoteError::new("ServiceNotFoundException", "Service not found."))?;
        if let Some(task_definition) = &update.task_definition {
            found.task_definition = task_definition.clone();
            for deployment in &mut found.deployments {
                deployment.task_definition = task_definition.clone();
            }
        }
        if let Some(desired_count) = update.desired_count {
            found.desired_count = desired_count;
            for deployment in &mut found.deployments {
                deployment.desired_count = desired_count;
            }
        }
        Ok(())
    }

    fn delete_service(&self, cluster: &str, service: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_service")?;
        state.require_cluster(cluster)?;
        let before = state.services.len();
        state
            .services
            .retain(|s| !(s.cluster == cluster && s.service_name == service));
        if state.services.len() == before {
            return Err(RemoteError::new("ServiceNotFoundException", "Service not found."));
        }
        Ok(())
    }

    fn list_services(&self, cluster: &str, _next_token: Option<String>) -> RemoteResult<Page<String>> {
        let state = self.enter("list_services")?;
        state.require_cluster(cluster)?;
        Ok(Page::last(
            state
                .services
                .iter()
                .filter(|s| s.cluster == cluster)
                .map(|s| arn(&format!("service/{}", s.service_name)))
                .collect(),
        ))
    }

    fn run_task(&self, input: &RunTaskInput) -> RemoteResult<DescribeTasksOutput> {
        let mut state = self.enter("run_task")?;
        state.require_cluster(&input.cluster)?;
        let Some(definition) = state.find_task_definition(&input.task_definition).cloned() else {
            return Err(RemoteError::new(
                "ClientException",
                "Unable to describe task definition.",
            ));
        };
        let id = state.next();
        let task = EcsTask {
            task_arn: arn(&format!("task/{}", id)),
            cluster: input.cluster.clone(),
            task_definition_arn: definition.arn.clone(),
            last_status: "PENDING".to_string(),
            desired_status: DesiredStatus::Running.as_str().to_string(),
            started_by: input.started_by.clone(),
            containers: definition
                .container_definitions
                .iter()
                .map(|c| Container {
                    name: c.name.clone(),
                    last_status: "PENDING".to_string(),
                    exit_code: None,
                    reason: None,
                })
                .collect(),
        };
        state.tasks.push(task.clone());
        Ok(DescribeTasksOutput {
            tasks: vec![task],
            failures: Vec::new(),
        })
    }

    fn stop_task(&self, cluster: &str, task: &str, _reason: &str) -> RemoteResult<()> {
        let mut state = self.enter("stop_task")?;
        state.require_cluster(cluster)?;
        let found = state
            .tasks
            .iter_mut()
            .find(|t| t.cluster == cluster && t.task_arn == task)
            .ok_or_else(|| {
                RemoteError::new("InvalidParameterException", "The referenced task was not found.")
            })?;
        found.desired_status = DesiredStatus::Stopped.as_str().to_string();
        found.last_status = "STOPPED".to_string();
        Ok(())
    }

    fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> RemoteResult<DescribeTasksOutput> {
        let state = self.enter("describe_tasks")?;
        state.require_cluster(cluster)?;
        let mut output = DescribeTasksOutput::default();
        for wanted in tasks {
            match state
                .tasks
                .iter()
                .find(|t| t.cluster == cluster && t.task_arn == *wanted)
            {
                Some(task) => output.tasks.push(task.clone()),
                None => output.failures.push(Failure {
                    arn: wanted.clone(),
                    reason: "MISSING".to_string(),
                }),
            }
        }
        Ok(output)
    }

    fn list_tasks(
        &self,
        cluster: &str,
        started_by: &str,
        status: DesiredStatus,
        _next_token: Option<String>,
    ) -> RemoteResult<Page<String>> {
        let state = self.enter("list_tasks")?;
        state.require_cluster(cluster)?;
        Ok(Page::last(
            state
                .tasks
                .iter()
                .filter(|t| {
                    t.cluster == cluster
                        && t.started_by == started_by
                        && t.desired_status == status.as_str()
                })
                .map(|t| t.task_arn.clone())
                .collect(),
        ))
    }

    fn list_container_instances(
        &self,
        cluster: &str,
        _next_token: Option<String>,
    ) -> RemoteResult<Page<String>> {
        let state = self.enter("list_container_instances")?;
        state.require_cluster(cluster)?;
        Ok(Page::last(
            state
                .container_instances
                .get(cluster)
                .into_iter()
                .flatten()
                .map(|i| i.arn.clone())
                .collect(),
        ))
    }

    fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> RemoteResult<Vec<ContainerInstance>> {
        let state = self.enter("describe_container_instances")?;
        Ok(state
            .container_instances
            .get(cluster)
            .into_iter()
            .flatten()
            .filter(|i| arns.contains(&i.arn))
            .cloned()
            .collect())
    }
}

impl ElbApi for FakeCloud {
    fn create_load_balancer(&self, input: &CreateLoadBalancerInput) -> RemoteResult<String> {
        let mut state = self.enter("create_load_balancer")?;
        let dns_name = format!("{}.{}.elb.amazonaws.com", input.name, REGION);
        state.load_balancers.insert(
            input.name.clone(),
            LoadBalancerDescription {
                name: input.name.clone(),
                dns_name: dns_name.clone(),
                scheme: input.scheme.clone(),
                listeners: input.listeners.clone(),
                health_check: ElbHealthCheck {
                    target: "TCP:80".to_string(),
                    interval: 30,
                    timeout: 5,
                    healthy_threshold: 10,
                    unhealthy_threshold: 2,
                },
                security_groups: input.security_groups.clone(),
                instance_ids: Vec::new(),
            },
        );
        Ok(dns_name)
    }

    fn describe_load_balancers(
        &self,
        names: &[String],
        _marker: Option<String>,
    ) -> RemoteResult<Page<LoadBalancerDescription>> {
        let state = self.enter("describe_load_balancers")?;
        if names.is_empty() {
            return Ok(Page::last(state.load_balancers.values().cloned().collect()));
        }
        let mut found = Vec::new();
        for name in names {
            let description = state.load_balancers.get(name).ok_or_else(|| {
                RemoteError::new(
                    "LoadBalancerNotFound",
                    format!("There is no ACTIVE Load Balancer named '{}'", name),
                )
            })?;
            found.push(description.clone());
        }
        Ok(Page::last(found))
    }

    fn delete_load_balancer(&self, name: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_load_balancer")?;
        state.load_balancers.remove(name);
        Ok(())
    }

    fn configure_health_check(
        &self,
        name: &str,
        health_check: &ElbHealthCheck,
    ) -> RemoteResult<()> {
        let mut state = self.enter("configure_health_check")?;
        let description = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| RemoteError::new("LoadBalancerNotFound", name.to_string()))?;
        description.health_check = health_check.clone();
        Ok(())
    }

    fn create_listeners(&self, name: &str, listeners: &[Listener]) -> RemoteResult<()> {
        let mut state = self.enter("create_listeners")?;
        let description = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| RemoteError::new("LoadBalancerNotFound", name.to_string()))?;
        description.listeners.extend_from_slice(listeners);
        Ok(())
    }

    fn delete_listeners(&self, name: &str, load_balancer_ports: &[i64]) -> RemoteResult<()> {
        let mut state = self.enter("delete_listeners")?;
        let description = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| RemoteError::new("LoadBalancerNotFound", name.to_string()))?;
        description
            .listeners
            .retain(|l| !load_balancer_ports.contains(&l.load_balancer_port));
        Ok(())
    }
}

impl IamApi for FakeCloud {
    fn create_role(&self, name: &str, _assume_role_policy: &str) -> RemoteResult<String> {
        let mut state = self.enter("create_role")?;
        if state.roles.contains_key(name) {
            return Err(RemoteError::new("EntityAlreadyExists", name.to_string()));
        }
        state.roles.insert(name.to_string(), Vec::new());
        Ok(format!("arn:aws:iam::{}:role/{}", ACCOUNT_ID, name))
    }

    fn delete_role(&self, name: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_role")?;
        state
            .roles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::new("NoSuchEntity", name.to_string()))
    }

    fn put_role_policy(&self, role: &str, policy_name: &str, _document: &str) -> RemoteResult<()> {
        let mut state = self.enter("put_role_policy")?;
        let policies = state
            .roles
            .get_mut(role)
            .ok_or_else(|| RemoteError::new("NoSuchEntity", role.to_string()))?;
        if !policies.iter().any(|p| p == policy_name) {
            policies.push(policy_name.to_string());
        }
        Ok(())
    }

    fn delete_role_policy(&self, role: &str, policy_name: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_role_policy")?;
        let policies = state
            .roles
            .get_mut(role)
            .ok_or_else(|| RemoteError::new("NoSuchEntity", role.to_string()))?;
        let before = policies.len();
        policies.retain(|p| p != policy_name);
        if policies.len() == before {
            return Err(RemoteError::new("NoSuchEntity", policy_name.to_string()));
        }
        Ok(())
    }

    fn list_server_certificates(
        &self,
        _marker: Option<String>,
    ) -> RemoteResult<Page<ServerCertificate>> {
        let state = self.enter("list_server_certificates")?;
        Ok(Page::last(state.certificates.clone()))
    }
}

pub fn test_config() -> L0Config {
    let mut config = L0Config::new(INSTANCE);
    config.aws.account_id = ACCOUNT_ID.to_string();
    config.aws.region = REGION.to_string();
    config.aws.vpc_id = "vpc-1".to_string();
    config.aws.private_subnets = vec!["subnet-private-a".to_string(), "subnet-private-b".to_string()];
    config.aws.public_subnets = vec!["subnet-public-a".to_string()];
    config.aws.linux_ami = "ami-linux".to_string();
    config.aws.windows_ami = "ami-windows".to_string();
    config.aws.instance_profile = "l0-test-profile".to_string();
    config.aws.ssh_key_pair = "l0-test-key".to_string();
    config.aws.s3_bucket = "l0-test-bucket".to_string();
    config.aws.log_group_name = "l0-test".to_string();
    config
}

/// Providers over a fake cloud and an in-memory tag store.
pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub store: Arc<MemoryTagStore>,
    pub context: ProviderContext,
    pub providers: Providers,
}

impl Harness {
    /// `ids` are handed out in order to created entities.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(test_config(), ids)
    }

    pub fn with_config<I, S>(config: L0Config, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cloud = FakeCloud::new();
        let store = Arc::new(MemoryTagStore::new());
        let context = ProviderContext::new(
            store.clone(),
            cloud.clients(),
            Arc::new(config),
            Arc::new(SequenceIdGenerator::new(ids)),
        );
        let providers = Providers::new(context.clone());
        Self {
            cloud,
            store,
            context,
            providers,
        }
    }

    pub fn fq(&self, entity_id: &str) -> String {
        self.context.fq(entity_id)
    }

    pub fn tag_store(&self) -> &dyn TagStore {
        self.store.as_ref()
    }
}
