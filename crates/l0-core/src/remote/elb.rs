//! Classic load balancers.

use super::{Page, RemoteResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub protocol: String,
    pub load_balancer_port: i64,
    pub instance_protocol: String,
    pub instance_port: i64,
    pub ssl_certificate_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElbHealthCheck {
    pub target: String,
    pub interval: i64,
    pub timeout: i64,
    pub healthy_threshold: i64,
    pub unhealthy_threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLoadBalancerInput {
    pub name: String,
    /// `internal` or `internet-facing`.
    pub scheme: String,
    pub security_groups: Vec<String>,
    pub subnets: Vec<String>,
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerDescription {
    pub name: String,
    pub dns_name: String,
    pub scheme: String,
    pub listeners: Vec<Listener>,
    pub health_check: ElbHealthCheck,
    pub security_groups: Vec<String>,
    pub instance_ids: Vec<String>,
}

pub trait ElbApi: Send + Sync {
    /// Returns the DNS name.
    fn create_load_balancer(&self, input: &CreateLoadBalancerInput) -> RemoteResult<String>;

    /// An empty `names` slice lists everything. Unknown names fail with
    /// `LoadBalancerNotFound`.
    fn describe_load_balancers(
        &self,
        names: &[String],
        marker: Option<String>,
    ) -> RemoteResult<Page<LoadBalancerDescription>>;

    fn delete_load_balancer(&self, name: &str) -> RemoteResult<()>;

    fn configure_health_check(&self, name: &str, health_check: &ElbHealthCheck)
    -> RemoteResult<()>;

    fn create_listeners(&self, name: &str, listeners: &[Listener]) -> RemoteResult<()>;

    fn delete_listeners(&self, name: &str, load_balancer_ports: &[i64]) -> RemoteResult<()>;
}
