//! Schema for `l0.toml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{HealthCheck, Port, Protocol};

use super::ApiConfig;

/// Longest instance name that still keeps load balancer names within the
/// provider's 32 character limit (`l0-` + instance + `-` + 12 char ID).
pub const MAX_INSTANCE_LENGTH: usize = 16;

pub const DEFAULT_INSTANCE_TYPE: &str = "m3.medium";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L0Config {
    pub instance: String,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub account_id: String,
    pub region: String,
    pub vpc_id: String,
    pub private_subnets: Vec<String>,
    pub public_subnets: Vec<String>,
    pub linux_ami: String,
    pub windows_ami: String,
    pub instance_profile: String,
    pub ssh_key_pair: String,
    pub s3_bucket: String,
    pub log_group_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub instance_type: String,
    pub load_balancer_port: Port,
    pub health_check: HealthCheck,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            load_balancer_port: Port::new(80, 80, Protocol::Http),
            health_check: HealthCheck::default(),
        }
    }
}

/// Intervals for the periodic background loops, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub janitor_interval_secs: u64,
    pub job_lifetime_secs: u64,
    pub scaler_interval_secs: u64,
    pub scale_grace_period_millis: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            janitor_interval_secs: 10 * 60,
            job_lifetime_secs: 60 * 60,
            scaler_interval_secs: 5 * 60,
            scale_grace_period_millis: 1000,
        }
    }
}

impl BackgroundConfig {
    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    pub fn job_lifetime(&self) -> Duration {
        Duration::from_secs(self.job_lifetime_secs)
    }

    pub fn scaler_interval(&self) -> Duration {
        Duration::from_secs(self.scaler_interval_secs)
    }

    pub fn scale_grace_period(&self) -> Duration {
        Duration::from_millis(self.scale_grace_period_millis)
    }
}

impl L0Config {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            aws: AwsConfig::default(),
            defaults: DefaultsConfig::default(),
            background: BackgroundConfig::default(),
        }
    }

    /// Applies `L0_*` overrides looked up through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(instance) = lookup("L0_INSTANCE") {
            self.instance = instance;
        }
        if let Some(region) = lookup("L0_AWS_REGION") {
            self.aws.region = region;
        }
        if let Some(account_id) = lookup("L0_AWS_ACCOUNT_ID") {
            self.aws.account_id = account_id;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.instance.is_empty() {
            anyhow::bail!("instance is required");
        }
        if !self.instance.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!(
                "instance '{}' may only contain ASCII letters and digits",
                self.instance
            );
        }
        if self.instance.len() > MAX_INSTANCE_LENGTH {
            anyhow::bail!(
                "instance '{}' is longer than {} characters",
                self.instance,
                MAX_INSTANCE_LENGTH
            );
        }
        self.defaults
            .health_check
            .validate()
            .map_err(|e| anyhow::anyhow!("defaults.health_check: {}", e))?;
        self.defaults
            .load_balancer_port
            .validate()
            .map_err(|e| anyhow::anyhow!("defaults.load_balancer_port: {}", e))?;
        Ok(())
    }
}

impl ApiConfig for L0Config {
    fn instance(&self) -> &str {
        &self.instance
    }

    fn account_id(&self) -> &str {
        &self.aws.account_id
    }

    fn region(&self) -> &str {
        &self.aws.region
    }

    fn vpc_id(&self) -> &str {
        &self.aws.vpc_id
    }

    fn private_subnets(&self) -> &[String] {
        &self.aws.private_subnets
    }

    fn public_subnets(&self) -> &[String] {
        &self.aws.public_subnets
    }

    fn linux_ami(&self) -> &str {
        &self.aws.linux_ami
    }

    fn windows_ami(&self) -> &str {
        &self.aws.windows_ami
    }

    fn instance_profile(&self) -> &str {
        &self.aws.instance_profile
    }

    fn ssh_key_pair(&self) -> &str {
        &self.aws.ssh_key_pair
    }

    fn s3_bucket(&self) -> &str {
        &self.aws.s3_bucket
    }

    fn log_group_name(&self) -> &str {
        &self.aws.log_group_name
    }

    fn default_instance_type(&self) -> &str {
        &self.defaults.instance_type
    }

    fn default_port(&self) -> Port {
        self.defaults.load_balancer_port.clone()
    }

    fn default_health_check(&self) -> HealthCheck {
        self.defaults.health_check.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_gets_defaults() {
        let config: L0Config = toml::from_str("instance = \"prod\"").unwrap();
        assert_eq!(config.default_instance_type(), DEFAULT_INSTANCE_TYPE);
        assert_eq!(config.default_port().host_port, 80);
        assert_eq!(config.background.job_lifetime(), Duration::from_secs(3600));
        config.validate().unwrap();
    }

    #[test]
    fn rejects_long_or_punctuated_instance() {
        assert!(L0Config::new("way-too-long-instance-name").validate().is_err());
        assert!(L0Config::new("a.b").validate().is_err());
        assert!(L0Config::new("").validate().is_err());
    }

    #[test]
    fn env_overrides_win() {
        let mut config = L0Config::new("prod");
        config.apply_env_overrides(|key| match key {
            "L0_INSTANCE" => Some("staging".to_string()),
            _ => None,
        });
        assert_eq!(config.instance(), "staging");
    }
}
