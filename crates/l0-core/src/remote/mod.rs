//! Remote-resource client boundary.
//!
//! One trait per resource family, shaped after the provider's own request
//! and response types. Production wires these to SDK clients; tests wire
//! them to an in-memory fake.

pub mod autoscaling;
pub mod ec2;
pub mod ecs;
pub mod elb;
pub mod iam;

use std::sync::Arc;

use thiserror::Error;

pub use autoscaling::{AutoScalingApi, AutoScalingGroup, AutoScalingGroupSize, LaunchConfiguration};
pub use ec2::{Ec2Api, IngressRule, IngressSource, SecurityGroup};
pub use ecs::{
    Container, ContainerDefinition, ContainerInstance, ContainerOverride, CreateServiceInput,
    DescribeTasksOutput, DesiredStatus, EcsApi, EcsService, EcsTask, Failure, KeyValuePair,
    LogConfiguration, PortMapping, RegisterTaskDefinitionInput, RunTaskInput, ServiceDeployment,
    ServiceLoadBalancer, ServiceUpdate, TaskDefinition,
};
pub use elb::{CreateLoadBalancerInput, ElbApi, ElbHealthCheck, Listener, LoadBalancerDescription};
pub use iam::{IamApi, ServerCertificate};

/// A failure reported by the remote provider, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code == code
    }

    pub fn mentions(&self, text: &str) -> bool {
        self.message.contains(text) || self.code.contains(text)
    }

    /// True if this error matches any of the given signatures.
    pub fn matches_any(&self, signatures: &[ErrorSignature]) -> bool {
        signatures.iter().any(|signature| signature.matches(self))
    }
}

/// Matches a remote error by exact code or by message substring.
///
/// Used to enumerate, per resource family, the errors that mean "already
/// gone" during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSignature {
    Code(&'static str),
    Message(&'static str),
}

impl ErrorSignature {
    pub fn matches(&self, err: &RemoteError) -> bool {
        match self {
            ErrorSignature::Code(code) => err.has_code(code),
            ErrorSignature::Message(text) => err.mentions(text),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One page of a paged list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Follows `next_token` until the listing is exhausted.
pub fn drain_pages<T, F>(mut fetch: F) -> RemoteResult<Vec<T>>
where
    F: FnMut(Option<String>) -> RemoteResult<Page<T>>,
{
    let mut items = Vec::new();
    let mut token = None;
    loop {
        let page = fetch(token.take())?;
        items.extend(page.items);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }
}

/// The set of remote clients handed to every provider.
#[derive(Clone)]
pub struct CloudClients {
    pub ec2: Arc<dyn Ec2Api>,
    pub autoscaling: Arc<dyn AutoScalingApi>,
    pub ecs: Arc<dyn EcsApi>,
    pub elb: Arc<dyn ElbApi>,
    pub iam: Arc<dyn IamApi>,
}

impl std::fmt::Debug for CloudClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClients").finish_non_exhaustive()
    }
}
