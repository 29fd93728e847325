//! Container clusters, task definitions, services and tasks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Page, RemoteResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    #[serde(default)]
    pub host_port: i64,
    pub container_port: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfiguration {
    pub log_driver: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub name: String,
    pub value: String,
}

/// A container definition as it appears in a Dockerrun document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_reservation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<LogConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub arn: String,
    pub family: String,
    pub revision: i64,
    pub status: String,
    pub task_role_arn: Option<String>,
    pub network_mode: Option<String>,
    pub container_definitions: Vec<ContainerDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTaskDefinitionInput {
    pub family: String,
    pub task_role_arn: Option<String>,
    pub network_mode: Option<String>,
    pub container_definitions: Vec<ContainerDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLoadBalancer {
    pub load_balancer_name: String,
    pub container_name: String,
    pub container_port: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateServiceInput {
    pub cluster: String,
    pub service_name: String,
    pub task_definition: String,
    pub desired_count: i64,
    pub role: Option<String>,
    pub load_balancers: Vec<ServiceLoadBalancer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDeployment {
    pub id: String,
    pub status: String,
    pub task_definition: String,
    pub desired_count: i64,
    pub running_count: i64,
    pub pending_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsService {
    pub service_name: String,
    pub cluster: String,
    pub status: String,
    pub task_definition: String,
    pub desired_count: i64,
    pub running_count: i64,
    pub pending_count: i64,
    pub deployments: Vec<ServiceDeployment>,
    pub load_balancers: Vec<ServiceLoadBalancer>,
}

/// Sparse service update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub task_definition: Option<String>,
    pub desired_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOverride {
    pub container_name: String,
    #[serde(default)]
    pub environment_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTaskInput {
    pub cluster: String,
    /// `family:revision` or a full ARN.
    pub task_definition: String,
    pub started_by: String,
    pub overrides: Vec<ContainerOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub arn: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub last_status: String,
    pub exit_code: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsTask {
    pub task_arn: String,
    pub cluster: String,
    pub task_definition_arn: String,
    pub last_status: String,
    pub desired_status: String,
    pub started_by: String,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeTasksOutput {
    pub tasks: Vec<EcsTask>,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredStatus {
    Running,
    Stopped,
}

impl DesiredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredStatus::Running => "RUNNING",
            DesiredStatus::Stopped => "STOPPED",
        }
    }
}

/// A registered cluster instance and its remaining capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInstance {
    pub arn: String,
    pub ec2_instance_id: String,
    pub agent_connected: bool,
    pub status: String,
    pub remaining_cpu: i64,
    /// MiB.
    pub remaining_memory: i64,
    /// Host ports already bound on the instance.
    pub used_ports: Vec<i64>,
    pub running_tasks_count: i64,
    pub pending_tasks_count: i64,
}

pub trait EcsApi: Send + Sync {
    fn create_cluster(&self, name: &str) -> RemoteResult<()>;

    fn delete_cluster(&self, name: &str) -> RemoteResult<()>;

    /// Cluster ARNs.
    fn list_clusters(&self, next_token: Option<String>) -> RemoteResult<Page<String>>;

    fn register_task_definition(
        &self,
        input: &RegisterTaskDefinitionInput,
    ) -> RemoteResult<TaskDefinition>;

    fn describe_task_definition(&self, task_definition: &str) -> RemoteResult<TaskDefinition>;

    fn deregister_task_definition(&self, task_definition: &str) -> RemoteResult<()>;

    /// Active family names starting with `family_prefix`.
    fn list_task_definition_families(
        &self,
        family_prefix: &str,
        next_token: Option<String>,
    ) -> RemoteResult<Page<String>>;

    /// Active task definition ARNs in `family`.
    fn list_task_definitions(
        &self,
        family: &str,
        next_token: Option<String>,
    ) -> RemoteResult<Page<String>>;

    fn create_service(&self, input: &CreateServiceInput) -> RemoteResult<EcsService>;

    fn describe_services(&self, cluster: &str, services: &[String])
    -> RemoteResult<Vec<EcsService>>;

    fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: &ServiceUpdate,
    ) -> RemoteResult<()>;

    fn delete_service(&self, cluster: &str, service: &str) -> RemoteResult<()>;

    /// Service ARNs in `cluster`.
    fn list_services(&self, cluster: &str, next_token: Option<String>)
    -> RemoteResult<Page<String>>;

    fn run_task(&self, input: &RunTaskInput) -> RemoteResult<DescribeTasksOutput>;

    fn stop_task(&self, cluster: &str, task: &str, reason: &str) -> RemoteResult<()>;

    fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> RemoteResult<DescribeTasksOutput>;

    /// Task ARNs in `cluster` started by `started_by`.
    fn list_tasks(
        &self,
        cluster: &str,
        started_by: &str,
        status: DesiredStatus,
        next_token: Option<String>,
    ) -> RemoteResult<Page<String>>;

    /// Active container instance ARNs in `cluster`.
    fn list_container_instances(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> RemoteResult<Page<String>>;

    fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> RemoteResult<Vec<ContainerInstance>>;
}
