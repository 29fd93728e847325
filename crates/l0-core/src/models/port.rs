//! Load balancer listener ports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Ssl,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
            Protocol::Ssl => "ssl",
        }
    }

    /// Protocol spoken between the load balancer and the instance; TLS
    /// terminates at the load balancer.
    pub fn instance_protocol(&self) -> Protocol {
        match self {
            Protocol::Http | Protocol::Https => Protocol::Http,
            Protocol::Tcp | Protocol::Ssl => Protocol::Tcp,
        }
    }

    pub fn requires_certificate(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::Ssl)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "tcp" => Ok(Protocol::Tcp),
            "ssl" => Ok(Protocol::Ssl),
            _ => Err(ProviderError::validation(format!(
                "Unrecognized protocol '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub host_port: i64,
    pub container_port: i64,
    pub protocol: Protocol,
    /// Server certificate name or ARN; required for https and ssl.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl Port {
    pub fn new(host_port: i64, container_port: i64, protocol: Protocol) -> Self {
        Self {
            host_port,
            container_port,
            protocol,
            certificate: None,
        }
    }

    pub fn with_certificate(mut self, certificate: impl Into<String>) -> Self {
        self.certificate = Some(certificate.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        for (label, port) in [("host", self.host_port), ("container", self.container_port)] {
            if !(1..=65535).contains(&port) {
                return Err(ProviderError::validation(format!(
                    "{} port {} is out of range",
                    label, port
                )));
            }
        }
        if self.protocol.requires_certificate() && self.certificate.is_none() {
            return Err(ProviderError::validation(format!(
                "{} port {} requires a certificate",
                self.protocol, self.host_port
            )));
        }
        Ok(())
    }
}
