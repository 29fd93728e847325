//! Task provider.
//!
//! Task ARNs are assigned by the remote scheduler, so the mapping from task
//! ID to ARN lives only in the task's `arn` tag.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::common::{self, absent, ignore_absent};
use super::{EntityProvider, ProviderContext};
use crate::error::{ProviderError, ProviderResult};
use crate::janitor::LiveSet;
use crate::models::deploy::split_deploy_id;
use crate::models::{CreateTaskRequest, Task, TaskContainer, TaskSummary};
use crate::remote::{DesiredStatus, EcsTask, ErrorSignature, RemoteError, RunTaskInput, drain_pages};
use crate::tag::Tag;
use crate::types::EntityType;

/// Failure reason the scheduler reports for an unknown task ARN.
const MISSING: &str = "MISSING";

const TASK_GONE: &[ErrorSignature] = &[
    ErrorSignature::Message("task was not found"),
    ErrorSignature::Code("ClusterNotFoundException"),
];

#[derive(Debug, Clone)]
pub struct TaskProvider {
    context: ProviderContext,
}

impl TaskProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    pub fn create(&self, req: &CreateTaskRequest) -> ProviderResult<String> {
        req.validate()?;
        let store = self.context.store.as_ref();

        common::require_tags(store, EntityType::Environment, &req.environment_id)?;
        common::require_tags(store, EntityType::Deploy, &req.deploy_id)?;
        let (deploy_name, version) = split_deploy_id(&req.deploy_id).ok_or_else(|| {
            ProviderError::validation(format!("Malformed deploy ID '{}'", req.deploy_id))
        })?;

        let task_id = self.context.ids.generate(&req.task_name);
        info!(
            task_id = %task_id,
            name = %req.task_name,
            environment_id = %req.environment_id,
            deploy_id = %req.deploy_id,
            "Running task"
        );

        let output = self.context.cloud.ecs.run_task(&RunTaskInput {
            cluster: self.context.fq(&req.environment_id),
            task_definition: format!("{}:{}", self.context.fq(deploy_name), version),
            started_by: self.context.instance().to_string(),
            overrides: req.container_overrides.clone(),
        })?;

        if !output.failures.is_empty() {
            let reasons: Vec<String> = output
                .failures
                .iter()
                .map(|failure| format!("{} ({})", failure.reason, failure.arn))
                .collect();
            return Err(RemoteError::new("TaskFailure", reasons.join(", ")).into());
        }
        let task = output.tasks.into_iter().next().ok_or_else(|| {
            ProviderError::from(RemoteError::new("TaskFailure", "run task returned no tasks"))
        })?;

        common::insert_tags(
            store,
            vec![
                Tag::new(EntityType::Task, &task_id, "name", &req.task_name),
                Tag::new(
                    EntityType::Task,
                    &task_id,
                    "environment_id",
                    &req.environment_id,
                ),
                Tag::new(EntityType::Task, &task_id, "deploy_id", &req.deploy_id),
                Tag::new(EntityType::Task, &task_id, "arn", &task.task_arn),
            ],
        )?;

        Ok(task_id)
    }

    pub fn read(&self, task_id: &str) -> ProviderResult<Task> {
        let store = self.context.store.as_ref();
        let tags = common::require_tags(store, EntityType::Task, task_id)?;
        let name = common::required_value(&tags, EntityType::Task, task_id, "name")?;
        let environment_id =
            common::required_value(&tags, EntityType::Task, task_id, "environment_id")?;
        let arn = common::required_value(&tags, EntityType::Task, task_id, "arn")?;

        let task = self.describe(task_id, &environment_id, &arn)?;
        Ok(Task {
            task_id: task_id.to_string(),
            task_name: name,
            environment_name: common::lookup_name(store, EntityType::Environment, &environment_id)?,
            environment_id,
            deploy_id: tags.value_of("deploy_id").map(str::to_string),
            status: task.last_status,
            containers: task
                .containers
                .into_iter()
                .map(|container| TaskContainer {
                    container_name: container.name,
                    status: container.last_status,
                    exit_code: container.exit_code,
                    meta: container.reason,
                })
                .collect(),
        })
    }

    pub fn list(&self) -> ProviderResult<Vec<TaskSummary>> {
        let store = self.context.store.as_ref();
        let mut summaries = Vec::new();
        for task_id in self.list_ids()? {
            let tags = store.select_by_type_and_id(EntityType::Task, &task_id)?;
            let (Some(name), Some(environment_id)) =
                (tags.value_of("name"), tags.value_of("environment_id"))
            else {
                continue;
            };
            summaries.push(TaskSummary {
                task_name: name.to_string(),
                environment_name: common::lookup_name(
                    store,
                    EntityType::Environment,
                    environment_id,
                )?,
                environment_id: environment_id.to_string(),
                task_id,
            });
        }
        Ok(summaries)
    }

    /// Stops the task. Tasks without tags, or already stopped, succeed.
    pub fn delete(&self, task_id: &str) -> ProviderResult<()> {
        let store = self.context.store.as_ref();
        let tags = store.select_by_type_and_id(EntityType::Task, task_id)?;
        if tags.is_empty() {
            debug!(task_id, "Task has no tags, already deleted");
            return Ok(());
        }

        if let (Some(environment_id), Some(arn)) =
            (tags.value_of("environment_id"), tags.value_of("arn"))
        {
            info!(task_id, environment_id, "Stopping task");
            ignore_absent(
                self.context.cloud.ecs.stop_task(
                    &self.context.fq(environment_id),
                    arn,
                    "Task deleted by l0",
                ),
                TASK_GONE,
                "task",
            )?;
        }

        common::delete_entity_tags(store, EntityType::Task, task_id)?;
        Ok(())
    }

    fn describe(&self, task_id: &str, environment_id: &str, arn: &str) -> ProviderResult<EcsTask> {
        let output = match self
            .context
            .cloud
            .ecs
            .describe_tasks(&self.context.fq(environment_id), &[arn.to_string()])
        {
            Ok(output) => output,
            Err(err) if err.matches_any(absent::TASK) || err.matches_any(absent::CLUSTER) => {
                return Err(ProviderError::does_not_exist(EntityType::Task, task_id));
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(failure) = output.failures.first() {
            if failure.reason == MISSING {
                return Err(ProviderError::does_not_exist(EntityType::Task, task_id));
            }
            return Err(RemoteError::new("TaskFailure", failure.reason.clone()).into());
        }
        output
            .tasks
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::does_not_exist(EntityType::Task, task_id))
    }

    /// ARNs of every running or stopped task this instance started.
    fn live_task_arns(&self) -> ProviderResult<Vec<String>> {
        let ecs = self.context.cloud.ecs.as_ref();
        let instance = self.context.instance();
        let mut arns = Vec::new();
        for cluster in common::instance_clusters(ecs, instance)? {
            for status in [DesiredStatus::Running, DesiredStatus::Stopped] {
                arns.extend(drain_pages(|token| {
                    ecs.list_tasks(&cluster, instance, status, token)
                })?);
            }
        }
        Ok(arns)
    }
}

impl EntityProvider for TaskProvider {
    fn entity_type(&self) -> EntityType {
        EntityType::Task
    }

    fn delete(&self, entity_id: &str) -> ProviderResult<()> {
        TaskProvider::delete(self, entity_id)
    }

    /// Live task ARNs mapped back to task IDs through their `arn` tags.
    fn list_ids(&self) -> ProviderResult<Vec<String>> {
        let by_arn: BTreeMap<String, String> = self
            .context
            .store
            .select_by_type(EntityType::Task)?
            .with_key("arn")
            .into_iter()
            .map(|tag| (tag.value, tag.entity_id))
            .collect();

        let mut ids: Vec<String> = self
            .live_task_arns()?
            .iter()
            .filter_map(|arn| by_arn.get(arn).cloned())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl LiveSet for TaskProvider {
    fn live_ids(&self) -> ProviderResult<Vec<String>> {
        self.list_ids()
    }
}
