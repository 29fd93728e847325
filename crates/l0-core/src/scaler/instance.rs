//! Capacity of the instance types an environment can run.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceSpec {
    /// CPU units (1024 per vCPU).
    pub cpu: i64,
    /// MiB.
    pub memory: i64,
}

const SPECS: &[(&str, InstanceSpec)] = &[
    ("t2.micro", InstanceSpec { cpu: 1024, memory: 1024 }),
    ("t2.small", InstanceSpec { cpu: 1024, memory: 2048 }),
    ("t2.medium", InstanceSpec { cpu: 2048, memory: 4096 }),
    ("t2.large", InstanceSpec { cpu: 2048, memory: 8192 }),
    ("t2.xlarge", InstanceSpec { cpu: 4096, memory: 16384 }),
    ("m3.medium", InstanceSpec { cpu: 1024, memory: 3840 }),
    ("m3.large", InstanceSpec { cpu: 2048, memory: 7680 }),
    ("m3.xlarge", InstanceSpec { cpu: 4096, memory: 15360 }),
    ("m3.2xlarge", InstanceSpec { cpu: 8192, memory: 30720 }),
    ("m4.large", InstanceSpec { cpu: 2048, memory: 8192 }),
    ("m4.xlarge", InstanceSpec { cpu: 4096, memory: 16384 }),
    ("m4.2xlarge", InstanceSpec { cpu: 8192, memory: 32768 }),
    ("m4.4xlarge", InstanceSpec { cpu: 16384, memory: 65536 }),
    ("c4.large", InstanceSpec { cpu: 2048, memory: 3840 }),
    ("c4.xlarge", InstanceSpec { cpu: 4096, memory: 7680 }),
    ("c4.2xlarge", InstanceSpec { cpu: 8192, memory: 15360 }),
    ("r4.large", InstanceSpec { cpu: 2048, memory: 15616 }),
    ("r4.xlarge", InstanceSpec { cpu: 4096, memory: 31232 }),
];

pub fn instance_spec(instance_type: &str) -> Option<InstanceSpec> {
    SPECS
        .iter()
        .find(|(name, _)| *name == instance_type)
        .map(|(_, spec)| *spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DEFAULT_INSTANCE_TYPE;

    #[test]
    fn default_instance_type_is_known() {
        assert!(instance_spec(DEFAULT_INSTANCE_TYPE).is_some());
        assert_eq!(instance_spec("x9.huge"), None);
    }
}
