//! Long-running services scheduled into an environment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub service_name: String,
    pub environment_id: String,
    pub deploy_id: String,
    #[serde(default)]
    pub load_balancer_id: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: i64,
}

fn default_scale() -> i64 {
    1
}

impl CreateServiceRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.service_name.trim().is_empty() {
            return Err(ProviderError::validation("ServiceName is required"));
        }
        if self.environment_id.trim().is_empty() {
            return Err(ProviderError::validation("EnvironmentID is required"));
        }
        if self.deploy_id.trim().is_empty() {
            return Err(ProviderError::validation("DeployID is required"));
        }
        if self.scale < 0 {
            return Err(ProviderError::validation("Scale cannot be negative"));
        }
        Ok(())
    }
}

/// Sparse update; each present field is applied independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    #[serde(default)]
    pub deploy_id: Option<String>,
    #[serde(default)]
    pub scale: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub deployment_id: String,
    pub deploy_id: Option<String>,
    pub status: String,
    pub desired_count: i64,
    pub running_count: i64,
    pub pending_count: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    pub service_name: String,
    pub environment_id: String,
    pub environment_name: Option<String>,
    pub load_balancer_id: Option<String>,
    pub load_balancer_name: Option<String>,
    pub desired_count: i64,
    pub running_count: i64,
    pub pending_count: i64,
    pub deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_id: String,
    pub service_name: String,
    pub environment_id: String,
    pub environment_name: Option<String>,
}
