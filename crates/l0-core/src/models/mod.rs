//! Domain request and response models.
//!
//! Read models are assembled by providers from tags plus live remote state;
//! nothing here is persisted as a whole.

pub mod deploy;
pub mod environment;
pub mod health_check;
pub mod load_balancer;
pub mod port;
pub mod service;
pub mod task;

pub use deploy::{CreateDeployRequest, Deploy, DeploySummary, Dockerrun};
pub use environment::{
    CreateEnvironmentRequest, Environment, EnvironmentLinkRequest, EnvironmentSummary,
    EnvironmentType, OperatingSystem, UpdateEnvironmentRequest,
};
pub use health_check::HealthCheck;
pub use load_balancer::{
    CLASSIC_LOAD_BALANCER_TYPE, CreateLoadBalancerRequest, LoadBalancer, LoadBalancerSummary,
    UpdateLoadBalancerRequest,
};
pub use port::{Port, Protocol};
pub use service::{CreateServiceRequest, Deployment, Service, ServiceSummary, UpdateServiceRequest};
pub use task::{CreateTaskRequest, Task, TaskContainer, TaskSummary};
