//! L0 Core Library
//!
//! Control plane for container workloads on a cloud provider: environments
//! (clusters), load balancers, deploys, services and tasks, with identity and
//! relationships kept in a tag store.

pub mod config;
pub mod error;
pub mod id;
pub mod janitor;
pub mod job;
pub mod models;
pub mod naming;
pub mod provider;
pub mod remote;
pub mod retry;
pub mod scaler;
pub mod tag;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ApiConfig, ConfigStore, L0Config};

    // Errors
    pub use crate::error::{ProviderError, ProviderResult};

    // Tags
    pub use crate::tag::{FileTagStore, MemoryTagStore, Tag, TagStore, Tags};
    pub use crate::types::EntityType;

    // Providers
    pub use crate::provider::{
        AdminProvider, DeployProvider, EntityProvider, EnvironmentProvider, LoadBalancerProvider,
        ProviderContext, Providers, ServiceProvider, TaskProvider,
    };

    // Jobs
    pub use crate::job::{Job, JobRunner, JobStatus, JobStore, JobType, MemoryJobStore, Worker};

    // Scaling and cleanup
    pub use crate::janitor::{JobJanitor, TagJanitor};
    pub use crate::scaler::{Dispatcher, EnvironmentScaler, ScaleScheduler};

    // Remote
    pub use crate::remote::{CloudClients, RemoteError};
}
