//! Error taxonomy surfaced by providers.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::retry::RetryError;
use crate::types::EntityType;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Malformed or missing request fields. Raised before any remote call.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{entity_type} '{entity_id}' does not exist")]
    EntityDoesNotExist {
        entity_type: EntityType,
        entity_id: String,
    },

    /// Delete blocked by entities that still reference the target.
    #[error(
        "cannot delete {entity_type} '{entity_id}' because it contains dependent {dependent_type}s: {}",
        .dependent_ids.join(", ")
    )]
    Dependency {
        entity_type: EntityType,
        entity_id: String,
        dependent_type: EntityType,
        dependent_ids: Vec<String>,
    },

    /// Unrecognized remote failure, passed through unchanged.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Gave up waiting for remote state to settle.
    #[error("eventual consistency: {0}")]
    EventualConsistency(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    pub fn validation(message: impl Into<String>) -> Self {
        ProviderError::Validation(message.into())
    }

    pub fn does_not_exist(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        ProviderError::EntityDoesNotExist {
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    pub fn is_does_not_exist(&self) -> bool {
        matches!(self, ProviderError::EntityDoesNotExist { .. })
    }

    /// Unwraps an operation error, or reports a stop condition as an
    /// eventual-consistency failure for `waiting_for`.
    pub fn from_retry(waiting_for: &str, err: RetryError<ProviderError>) -> Self {
        match err {
            RetryError::Operation(err) => err,
            other => ProviderError::EventualConsistency(format!("{}: {}", waiting_for, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_message_lists_ids() {
        let err = ProviderError::Dependency {
            entity_type: EntityType::Environment,
            entity_id: "env1".into(),
            dependent_type: EntityType::Service,
            dependent_ids: vec!["svc1".into(), "svc2".into()],
        };
        assert_eq!(
            err.to_string(),
            "cannot delete environment 'env1' because it contains dependent services: svc1, svc2"
        );
    }

    #[test]
    fn retry_timeout_becomes_eventual_consistency() {
        let err = ProviderError::from_retry(
            "security group",
            RetryError::Timeout(std::time::Duration::from_secs(30)),
        );
        assert!(matches!(err, ProviderError::EventualConsistency(_)));

        let err = ProviderError::from_retry(
            "security group",
            RetryError::Operation(ProviderError::validation("bad")),
        );
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
