//! IAM roles, inline policies and server certificates.

use super::{Page, RemoteResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCertificate {
    pub name: String,
    pub arn: String,
}

pub trait IamApi: Send + Sync {
    /// Returns the role ARN.
    fn create_role(&self, name: &str, assume_role_policy: &str) -> RemoteResult<String>;

    fn delete_role(&self, name: &str) -> RemoteResult<()>;

    fn put_role_policy(&self, role: &str, policy_name: &str, document: &str) -> RemoteResult<()>;

    fn delete_role_policy(&self, role: &str, policy_name: &str) -> RemoteResult<()>;

    fn list_server_certificates(
        &self,
        marker: Option<String>,
    ) -> RemoteResult<Page<ServerCertificate>>;
}
