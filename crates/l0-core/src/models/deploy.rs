//! Deploys: versioned task definitions built from a Dockerrun document.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::remote::ContainerDefinition;

/// The subset of a Dockerrun document the control plane understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dockerrun {
    pub container_definitions: Vec<ContainerDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeployRequest {
    pub deploy_name: String,
    pub dockerrun: Dockerrun,
}

impl CreateDeployRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.deploy_name.trim().is_empty() {
            return Err(ProviderError::validation("DeployName is required"));
        }
        // '.' separates name from version in deploy IDs.
        if self.deploy_name.contains('.') {
            return Err(ProviderError::validation(
                "Deploy names cannot contain '.'",
            ));
        }
        if self.dockerrun.container_definitions.is_empty() {
            return Err(ProviderError::validation(
                "Dockerrun must contain at least one container definition",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    /// `<deploy_name>.<version>`
    pub deploy_id: String,
    pub deploy_name: String,
    pub version: String,
    pub dockerrun: Dockerrun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySummary {
    pub deploy_id: String,
    pub deploy_name: String,
    pub version: String,
}

/// Builds `<name>.<version>`.
pub fn deploy_id(deploy_name: &str, version: &str) -> String {
    format!("{}.{}", deploy_name, version)
}

/// Splits `<name>.<version>`.
pub fn split_deploy_id(deploy_id: &str) -> Option<(&str, &str)> {
    deploy_id
        .rsplit_once('.')
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
}
