//! Load balancer health checks.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Classic load balancer health check.
///
/// `target` is `PROTOCOL:PORT[/PATH]`, e.g. `TCP:80` or `HTTP:8080/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub target: String,
    pub interval: i64,
    pub timeout: i64,
    pub healthy_threshold: i64,
    pub unhealthy_threshold: i64,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            target: "TCP:80".to_string(),
            interval: 30,
            timeout: 5,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }
}

impl HealthCheck {
    pub fn validate(&self) -> Result<(), ProviderError> {
        let (protocol, rest) = self.target.split_once(':').ok_or_else(|| {
            ProviderError::validation(format!(
                "health check target '{}' must look like PROTOCOL:PORT",
                self.target
            ))
        })?;

        let protocol = protocol.to_ascii_lowercase();
        let (port, path) = match rest.split_once('/') {
            Some((port, path)) => (port, Some(path)),
            None => (rest, None),
        };

        if port.parse::<u16>().is_err() {
            return Err(ProviderError::validation(format!(
                "health check target '{}' has an invalid port",
                self.target
            )));
        }

        match protocol.as_str() {
            "http" | "https" => {
                if path.is_none() {
                    return Err(ProviderError::validation(
                        "HTTP & HTTPS targets must specify a port followed by a path, e.g. HTTPS:443/health",
                    ));
                }
            }
            "tcp" | "ssl" => {
                if path.is_some() {
                    return Err(ProviderError::validation(format!(
                        "{} health check targets cannot specify a path",
                        protocol.to_ascii_uppercase()
                    )));
                }
            }
            _ => {
                return Err(ProviderError::validation(format!(
                    "health check target '{}' has an unrecognized protocol",
                    self.target
                )));
            }
        }

        for (field, value) in [
            ("interval", self.interval),
            ("timeout", self.timeout),
            ("healthy_threshold", self.healthy_threshold),
            ("unhealthy_threshold", self.unhealthy_threshold),
        ] {
            if value <= 0 {
                return Err(ProviderError::validation(format!(
                    "health check {} is required",
                    field
                )));
            }
        }

        if self.timeout >= self.interval {
            return Err(ProviderError::validation(
                "health check timeout must be less than its interval",
            ));
        }

        Ok(())
    }
}
