//! Environment autoscaling.
//!
//! The scaler packs resource consumers (pending service copies and tasks
//! about to run) onto resource providers (container instances), adds new
//! instances when they do not fit and releases instances nothing runs on.

pub mod dispatcher;
pub mod environment;
pub mod instance;
pub mod plan;
pub mod resource;

use thiserror::Error;

use crate::error::ProviderError;

pub use dispatcher::Dispatcher;
pub use environment::{EnvironmentScaler, ScaleReport};
pub use instance::{InstanceSpec, instance_spec};
pub use plan::{Distribution, calculate_scale_down, calculate_scale_up};
pub use resource::{DEFAULT_RESERVED_PORTS, ResourceConsumer, ResourceProvider};

#[derive(Debug, Error)]
pub enum ScalerError {
    /// Consumers that would not fit even on an empty instance. Scaling of
    /// everything else still happens.
    #[error("consumers cannot fit into an empty instance; increase the environment's instance size: {}", .consumer_ids.join(", "))]
    IncompatibleConsumer { consumer_ids: Vec<String> },

    #[error("instance type '{0}' is not recognized")]
    UnknownInstanceType(String),

    #[error("cannot subtract resources for consumer '{consumer}' from provider '{provider}'")]
    InsufficientResources { consumer: String, provider: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Requests a (debounced) scaling pass for one environment.
pub trait ScaleScheduler: Send + Sync {
    fn schedule_run(&self, environment_id: &str);
}

/// Runs one scaling pass synchronously.
pub trait Scaler: Send + Sync {
    fn scale(&self, environment_id: &str) -> Result<ScaleReport, ScalerError>;
}

/// Scheduler that drops every request; for callers with no scaler wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl ScaleScheduler for NoopScheduler {
    fn schedule_run(&self, environment_id: &str) {
        tracing::debug!(environment_id, "Scaling disabled, ignoring request");
    }
}
