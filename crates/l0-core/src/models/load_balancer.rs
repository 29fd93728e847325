//! Classic load balancers fronting services in one environment.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

use super::{HealthCheck, Port};

/// The only load balancer flavour this control plane provisions.
pub const CLASSIC_LOAD_BALANCER_TYPE: &str = "classic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoadBalancerRequest {
    pub load_balancer_name: String,
    pub environment_id: String,
    #[serde(default)]
    pub is_public: bool,
    /// Empty means the configured default port.
    #[serde(default)]
    pub ports: Vec<Port>,
    /// `None` means the configured default health check.
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

impl CreateLoadBalancerRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.load_balancer_name.trim().is_empty() {
            return Err(ProviderError::validation("LoadBalancerName is required"));
        }
        if self.environment_id.trim().is_empty() {
            return Err(ProviderError::validation("EnvironmentID is required"));
        }
        for port in &self.ports {
            port.validate()?;
        }
        if let Some(health_check) = &self.health_check {
            health_check.validate()?;
        }
        Ok(())
    }
}

/// Sparse update; each present field is applied independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLoadBalancerRequest {
    #[serde(default)]
    pub ports: Option<Vec<Port>>,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

impl UpdateLoadBalancerRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if let Some(ports) = &self.ports {
            if ports.is_empty() {
                return Err(ProviderError::validation(
                    "a load balancer needs at least one port",
                ));
            }
            for port in ports {
                port.validate()?;
            }
        }
        if let Some(health_check) = &self.health_check {
            health_check.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    pub load_balancer_type: String,
    pub environment_id: String,
    pub environment_name: Option<String>,
    pub is_public: bool,
    pub url: String,
    pub ports: Vec<Port>,
    pub health_check: HealthCheck,
    /// IDs of services attached through their `load_balancer_id` tag.
    pub service_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSummary {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    pub environment_id: String,
    pub environment_name: Option<String>,
}
