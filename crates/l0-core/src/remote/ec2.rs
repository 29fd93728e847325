//! Security groups.

use super::RemoteResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressSource {
    Cidr(String),
    Group(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    /// `tcp`, `udp` or `-1` for all traffic.
    pub protocol: String,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    pub source: IngressSource,
}

impl IngressRule {
    /// All traffic from members of `group_id`.
    pub fn all_from_group(group_id: impl Into<String>) -> Self {
        Self {
            protocol: "-1".to_string(),
            from_port: None,
            to_port: None,
            source: IngressSource::Group(group_id.into()),
        }
    }

    /// TCP on one port from anywhere.
    pub fn tcp_from_anywhere(port: i64) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port: Some(port),
            to_port: Some(port),
            source: IngressSource::Cidr("0.0.0.0/0".to_string()),
        }
    }

    pub fn source_group(&self) -> Option<&str> {
        match &self.source {
            IngressSource::Group(id) => Some(id),
            IngressSource::Cidr(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub vpc_id: String,
    pub ingress: Vec<IngressRule>,
}

pub trait Ec2Api: Send + Sync {
    /// Returns the new group's ID.
    fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> RemoteResult<String>;

    /// Groups whose name matches the `group-name` filter.
    fn describe_security_groups_by_name(&self, name: &str) -> RemoteResult<Vec<SecurityGroup>>;

    fn delete_security_group(&self, group_id: &str) -> RemoteResult<()>;

    fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> RemoteResult<()>;

    fn revoke_ingress(&self, group_id: &str, rule: &IngressRule) -> RemoteResult<()>;
}
