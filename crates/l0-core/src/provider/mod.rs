//! Resource providers: one per entity type.
//!
//! Each provider turns a logical Create/Read/Update/Delete into an ordered
//! sequence of remote calls, and records identity and relationships in the
//! tag store. Entities move absent -> present -> absent; there is no
//! persisted in-between state, so every step must be safe to re-run.

pub mod admin;
pub mod common;
pub mod deploy;
pub mod environment;
pub mod load_balancer;
pub mod service;
pub mod task;

use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::ProviderResult;
use crate::id::IdGenerator;
use crate::remote::CloudClients;
use crate::tag::TagStore;
use crate::types::EntityType;

pub use admin::AdminProvider;
pub use common::DependencyCheck;
pub use deploy::DeployProvider;
pub use environment::EnvironmentProvider;
pub use load_balancer::LoadBalancerProvider;
pub use service::ServiceProvider;
pub use task::TaskProvider;

/// Collaborators shared by every provider.
#[derive(Clone)]
pub struct ProviderContext {
    pub store: Arc<dyn TagStore>,
    pub cloud: CloudClients,
    pub config: Arc<dyn ApiConfig>,
    pub ids: Arc<dyn IdGenerator>,
}

impl ProviderContext {
    pub fn new(
        store: Arc<dyn TagStore>,
        cloud: CloudClients,
        config: Arc<dyn ApiConfig>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            cloud,
            config,
            ids,
        }
    }

    pub fn instance(&self) -> &str {
        self.config.instance()
    }

    /// `l0-<instance>-<entity_id>`
    pub fn fq(&self, entity_id: &str) -> String {
        crate::naming::fq_name(self.instance(), entity_id)
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("instance", &self.instance())
            .finish_non_exhaustive()
    }
}

/// The capability every provider shares, used where callers dispatch by
/// entity type without knowing the concrete provider.
pub trait EntityProvider: Send + Sync {
    fn entity_type(&self) -> EntityType;

    /// Idempotent: deleting an absent entity succeeds.
    fn delete(&self, entity_id: &str) -> ProviderResult<()>;

    /// IDs of every entity of this type owned by the running instance.
    fn list_ids(&self) -> ProviderResult<Vec<String>>;
}

/// Every provider built over one context.
#[derive(Debug, Clone)]
pub struct Providers {
    pub environment: Arc<EnvironmentProvider>,
    pub load_balancer: Arc<LoadBalancerProvider>,
    pub deploy: Arc<DeployProvider>,
    pub service: Arc<ServiceProvider>,
    pub task: Arc<TaskProvider>,
    pub admin: Arc<AdminProvider>,
}

impl Providers {
    pub fn new(context: ProviderContext) -> Self {
        Self {
            environment: Arc::new(EnvironmentProvider::new(context.clone())),
            load_balancer: Arc::new(LoadBalancerProvider::new(context.clone())),
            deploy: Arc::new(DeployProvider::new(context.clone())),
            service: Arc::new(ServiceProvider::new(context.clone())),
            task: Arc::new(TaskProvider::new(context.clone())),
            admin: Arc::new(AdminProvider::new(context)),
        }
    }

    /// Looks up the provider for `entity_type`; jobs have none.
    pub fn for_type(&self, entity_type: EntityType) -> Option<Arc<dyn EntityProvider>> {
        match entity_type {
            EntityType::Environment => Some(self.environment.clone()),
            EntityType::LoadBalancer => Some(self.load_balancer.clone()),
            EntityType::Deploy => Some(self.deploy.clone()),
            EntityType::Service => Some(self.service.clone()),
            EntityType::Task => Some(self.task.clone()),
            EntityType::Job => None,
        }
    }
}
