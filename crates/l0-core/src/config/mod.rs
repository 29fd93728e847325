//! Configuration consumed by providers.
//!
//! Providers only see the read-only [`ApiConfig`] accessor. [`L0Config`] is
//! the file-backed implementation loaded from `l0.toml`.

pub mod schema;
pub mod store;

use crate::models::{HealthCheck, Port};

pub use schema::{AwsConfig, BackgroundConfig, DefaultsConfig, L0Config};
pub use store::ConfigStore;

/// Read-only configuration accessor handed to providers.
pub trait ApiConfig: Send + Sync {
    /// Deployment-wide name; every remote resource is prefixed `l0-<instance>-`.
    fn instance(&self) -> &str;
    fn account_id(&self) -> &str;
    fn region(&self) -> &str;
    fn vpc_id(&self) -> &str;
    fn private_subnets(&self) -> &[String];
    fn public_subnets(&self) -> &[String];
    fn linux_ami(&self) -> &str;
    fn windows_ami(&self) -> &str;
    fn instance_profile(&self) -> &str;
    fn ssh_key_pair(&self) -> &str;
    fn s3_bucket(&self) -> &str;
    fn log_group_name(&self) -> &str;
    fn default_instance_type(&self) -> &str;
    fn default_port(&self) -> Port;
    fn default_health_check(&self) -> HealthCheck;
}
