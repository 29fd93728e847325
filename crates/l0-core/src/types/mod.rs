//! Shared core types used across the tag, provider and job layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical entity kinds managed by the control plane.
///
/// The string form is what lands in the tag store's `entity_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Environment,
    LoadBalancer,
    Deploy,
    Service,
    Task,
    Job,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Environment,
        EntityType::LoadBalancer,
        EntityType::Deploy,
        EntityType::Service,
        EntityType::Task,
        EntityType::Job,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Environment => "environment",
            EntityType::LoadBalancer => "load_balancer",
            EntityType::Deploy => "deploy",
            EntityType::Service => "service",
            EntityType::Task => "task",
            EntityType::Job => "job",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown entity type '{}'", s))
    }
}
