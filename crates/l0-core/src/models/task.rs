//! One-off tasks run to completion inside an environment.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::remote::ContainerOverride;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub task_name: String,
    pub environment_id: String,
    pub deploy_id: String,
    #[serde(default)]
    pub container_overrides: Vec<ContainerOverride>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.task_name.trim().is_empty() {
            return Err(ProviderError::validation("TaskName is required"));
        }
        if self.environment_id.trim().is_empty() {
            return Err(ProviderError::validation("EnvironmentID is required"));
        }
        if self.deploy_id.trim().is_empty() {
            return Err(ProviderError::validation("DeployID is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContainer {
    pub container_name: String,
    pub status: String,
    pub exit_code: Option<i64>,
    pub meta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_name: String,
    pub environment_id: String,
    pub environment_name: Option<String>,
    pub deploy_id: Option<String>,
    pub status: String,
    pub containers: Vec<TaskContainer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub task_name: String,
    pub environment_id: String,
    pub environment_name: Option<String>,
}
