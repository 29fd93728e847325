//! Resource providers (instances) and consumers (containers).

use serde::{Deserialize, Serialize};

use super::ScalerError;

/// Host ports every container instance holds for itself (ssh, docker, agent).
pub const DEFAULT_RESERVED_PORTS: [i64; 5] = [22, 2376, 2375, 51678, 51679];

/// Container instance status that can accept work.
pub const ACTIVE: &str = "ACTIVE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProvider {
    pub id: String,
    pub agent_connected: bool,
    pub status: String,
    pub in_use: bool,
    /// CPU units.
    pub available_cpu: i64,
    /// MiB.
    pub available_memory: i64,
    pub used_ports: Vec<i64>,
}

impl ResourceProvider {
    /// A fresh, connected, empty instance with only the reserved ports bound.
    pub fn new_instance(id: impl Into<String>, cpu: i64, memory: i64) -> Self {
        Self {
            id: id.into(),
            agent_connected: true,
            status: ACTIVE.to_string(),
            in_use: false,
            available_cpu: cpu,
            available_memory: memory,
            used_ports: DEFAULT_RESERVED_PORTS.to_vec(),
        }
    }

    pub fn has_resources_for(&self, consumer: &ResourceConsumer) -> bool {
        if !self.agent_connected || self.status != ACTIVE {
            return false;
        }
        if consumer.ports.iter().any(|port| self.used_ports.contains(port)) {
            return false;
        }
        consumer.cpu <= self.available_cpu && consumer.memory <= self.available_memory
    }

    pub fn subtract_resources_for(&mut self, consumer: &ResourceConsumer) -> Result<(), ScalerError> {
        if !self.has_resources_for(consumer) {
            return Err(ScalerError::InsufficientResources {
                consumer: consumer.id.clone(),
                provider: self.id.clone(),
            });
        }
        self.available_cpu -= consumer.cpu;
        self.available_memory -= consumer.memory;
        self.in_use = true;
        self.used_ports.extend_from_slice(&consumer.ports);
        Ok(())
    }
}

/// One container waiting for a place to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConsumer {
    pub id: String,
    pub cpu: i64,
    /// MiB.
    pub memory: i64,
    /// Host ports the container binds.
    pub ports: Vec<i64>,
}

impl ResourceConsumer {
    pub fn new(id: impl Into<String>, cpu: i64, memory: i64, ports: Vec<i64>) -> Self {
        Self {
            id: id.into(),
            cpu,
            memory,
            ports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ports_block_consumers() {
        let provider = ResourceProvider::new_instance("i-1", 1024, 2048);
        assert!(!provider.has_resources_for(&ResourceConsumer::new("ssh", 0, 0, vec![22])));
        assert!(provider.has_resources_for(&ResourceConsumer::new("web", 512, 512, vec![80])));
    }

    #[test]
    fn subtract_marks_in_use_and_binds_ports() {
        let mut provider = ResourceProvider::new_instance("i-1", 1024, 2048);
        let web = ResourceConsumer::new("web", 512, 1024, vec![80]);
        provider.subtract_resources_for(&web).unwrap();
        assert!(provider.in_use);
        assert_eq!(provider.available_cpu, 512);
        assert_eq!(provider.available_memory, 1024);
        assert!(!provider.has_resources_for(&web));
        assert!(matches!(
            provider.subtract_resources_for(&web),
            Err(ScalerError::InsufficientResources { .. })
        ));
    }

    #[test]
    fn disconnected_or_draining_providers_take_nothing() {
        let consumer = ResourceConsumer::new("c", 1, 1, vec![]);
        let mut provider = ResourceProvider::new_instance("i-1", 1024, 2048);
        provider.agent_connected = false;
        assert!(!provider.has_resources_for(&consumer));
        provider.agent_connected = true;
        provider.status = "DRAINING".into();
        assert!(!provider.has_resources_for(&consumer));
    }
}
