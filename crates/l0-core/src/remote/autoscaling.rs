//! Autoscaling groups and launch configurations.

use super::RemoteResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfiguration {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub security_groups: Vec<String>,
    pub iam_instance_profile: String,
    pub key_name: String,
    /// Base64 encoded.
    pub user_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoScalingGroup {
    pub name: String,
    pub launch_configuration_name: String,
    pub min_size: i64,
    pub max_size: i64,
    pub desired_capacity: i64,
    /// Comma-joined subnet IDs, as the API takes them.
    pub vpc_zone_identifier: String,
    pub instance_ids: Vec<String>,
    pub tags: Vec<(String, String)>,
}

/// Sparse size update; absent bounds are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoScalingGroupSize {
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub desired_capacity: Option<i64>,
}

pub trait AutoScalingApi: Send + Sync {
    fn create_launch_configuration(&self, config: &LaunchConfiguration) -> RemoteResult<()>;

    fn describe_launch_configurations(&self, name: &str)
    -> RemoteResult<Vec<LaunchConfiguration>>;

    fn delete_launch_configuration(&self, name: &str) -> RemoteResult<()>;

    fn create_auto_scaling_group(&self, group: &AutoScalingGroup) -> RemoteResult<()>;

    fn describe_auto_scaling_groups(&self, name: &str) -> RemoteResult<Vec<AutoScalingGroup>>;

    fn update_auto_scaling_group(&self, name: &str, size: &AutoScalingGroupSize)
    -> RemoteResult<()>;

    fn delete_auto_scaling_group(&self, name: &str, force: bool) -> RemoteResult<()>;

    fn terminate_instance(&self, instance_id: &str, decrement_capacity: bool) -> RemoteResult<()>;
}
