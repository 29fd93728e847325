//! Environments: a cluster of container instances behind one security group.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    /// Instances managed through an autoscaling group.
    #[default]
    Static,
    /// Cluster only; capacity comes from outside the autoscaling group.
    Dynamic,
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Static => "static",
            EnvironmentType::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(EnvironmentType::Static),
            "dynamic" => Ok(EnvironmentType::Dynamic),
            _ => Err(ProviderError::validation(format!(
                "Unrecognized environment type '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    #[default]
    Linux,
    Windows,
}

impl OperatingSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Windows => "windows",
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingSystem {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(OperatingSystem::Linux),
            "windows" => Ok(OperatingSystem::Windows),
            _ => Err(ProviderError::validation(format!(
                "Unrecognized operating system '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub environment_name: String,
    #[serde(default)]
    pub environment_type: EnvironmentType,
    #[serde(default)]
    pub operating_system: OperatingSystem,
    /// Falls back to the configured default instance type.
    #[serde(default)]
    pub instance_type: Option<String>,
    /// Falls back to the configured AMI for the operating system.
    #[serde(default)]
    pub ami_id: Option<String>,
    /// Initial min and max size of the autoscaling group.
    #[serde(default)]
    pub scale: i64,
    /// Custom user data template; `{{cluster}}` and `{{s3_bucket}}` are substituted.
    #[serde(default)]
    pub user_data: Option<String>,
}

impl CreateEnvironmentRequest {
    pub fn new(environment_name: impl Into<String>) -> Self {
        Self {
            environment_name: environment_name.into(),
            environment_type: EnvironmentType::Static,
            operating_system: OperatingSystem::Linux,
            instance_type: None,
            ami_id: None,
            scale: 0,
            user_data: None,
        }
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.environment_name.trim().is_empty() {
            return Err(ProviderError::validation("EnvironmentName is required"));
        }
        if self.scale < 0 {
            return Err(ProviderError::validation("Scale cannot be negative"));
        }
        Ok(())
    }
}

/// Sparse update. Either bound may be given alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEnvironmentRequest {
    #[serde(default)]
    pub min_scale: Option<i64>,
    #[serde(default)]
    pub max_scale: Option<i64>,
}

impl UpdateEnvironmentRequest {
    pub fn is_empty(&self) -> bool {
        self.min_scale.is_none() && self.max_scale.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentLinkRequest {
    pub source_environment_id: String,
    pub dest_environment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub environment_id: String,
    pub environment_name: String,
    pub environment_type: EnvironmentType,
    pub operating_system: OperatingSystem,
    pub security_group_id: String,
    pub instance_type: Option<String>,
    pub ami_id: Option<String>,
    pub min_scale: i64,
    pub current_scale: i64,
    pub max_scale: i64,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub environment_id: String,
    pub environment_name: String,
    pub environment_type: EnvironmentType,
    pub operating_system: OperatingSystem,
}
