//! Helpers shared across providers: tag bookkeeping, dependency checks,
//! "already absent" error matching, and security group lifecycle.

use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};
use crate::naming;
use crate::remote::{
    Ec2Api, EcsApi, ErrorSignature, RemoteError, RemoteResult, SecurityGroup, drain_pages,
};
use crate::retry::{self, with_delay, with_timeout};
use crate::tag::{Tag, TagStore, Tags};
use crate::types::EntityType;

/// How long to wait for eventually-consistent remote state.
pub const CONSISTENCY_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between consistency polls.
pub const CONSISTENCY_DELAY: Duration = Duration::from_secs(1);

/// Code used for "looked up by name, found nothing".
pub const DOES_NOT_EXIST: &str = "DoesNotExist";

/// Remote errors that mean the resource is already gone, per family.
pub mod absent {
    use crate::remote::ErrorSignature::{self, Code, Message};

    pub const AUTO_SCALING_GROUP: &[ErrorSignature] =
        &[Message("AutoScalingGroup name not found")];
    pub const LAUNCH_CONFIGURATION: &[ErrorSignature] =
        &[Message("Launch configuration name not found")];
    pub const SECURITY_GROUP: &[ErrorSignature] = &[
        Code("InvalidGroup.NotFound"),
        Code(super::DOES_NOT_EXIST),
        Message("does not exist"),
    ];
    pub const CLUSTER: &[ErrorSignature] = &[Code("ClusterNotFoundException")];
    pub const LOAD_BALANCER: &[ErrorSignature] = &[Code("LoadBalancerNotFound")];
    pub const IAM: &[ErrorSignature] = &[Code("NoSuchEntity")];
    pub const TASK_DEFINITION: &[ErrorSignature] =
        &[Message("Unable to describe task definition")];
    pub const SERVICE: &[ErrorSignature] = &[
        Code("ServiceNotFoundException"),
        Code("ServiceNotActiveException"),
    ];
    pub const TASK: &[ErrorSignature] = &[Message("task was not found")];
}

/// Treats errors matching `signatures` as success.
pub fn ignore_absent(
    result: RemoteResult<()>,
    signatures: &[ErrorSignature],
    what: &str,
) -> ProviderResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.matches_any(signatures) => {
            tracing::debug!(resource = what, error = %err, "Remote resource already absent");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn insert_tags(store: &dyn TagStore, tags: Vec<Tag>) -> ProviderResult<()> {
    for tag in tags {
        store.insert(tag)?;
    }
    Ok(())
}

/// Deletes every tag of one entity and returns how many there were.
pub fn delete_entity_tags(
    store: &dyn TagStore,
    entity_type: EntityType,
    entity_id: &str,
) -> ProviderResult<usize> {
    let tags = store.select_by_type_and_id(entity_type, entity_id)?;
    for tag in &tags {
        store.delete(tag.entity_type, &tag.entity_id, &tag.key)?;
    }
    Ok(tags.len())
}

/// An entity's tags, or `EntityDoesNotExist` when it has none.
pub fn require_tags(
    store: &dyn TagStore,
    entity_type: EntityType,
    entity_id: &str,
) -> ProviderResult<Tags> {
    let tags = store.select_by_type_and_id(entity_type, entity_id)?;
    if tags.is_empty() {
        return Err(ProviderError::does_not_exist(entity_type, entity_id));
    }
    Ok(tags)
}

/// Value of a tag the entity must carry.
pub fn required_value(
    tags: &Tags,
    entity_type: EntityType,
    entity_id: &str,
    key: &str,
) -> ProviderResult<String> {
    tags.value_of(key).map(str::to_string).ok_or_else(|| {
        ProviderError::Store(anyhow::anyhow!(
            "Could not resolve {} for {} '{}'",
            key,
            entity_type,
            entity_id
        ))
    })
}

pub fn lookup_environment_id(
    store: &dyn TagStore,
    entity_type: EntityType,
    entity_id: &str,
) -> ProviderResult<String> {
    let tags = require_tags(store, entity_type, entity_id)?;
    required_value(&tags, entity_type, entity_id, "environment_id")
}

pub fn lookup_name(
    store: &dyn TagStore,
    entity_type: EntityType,
    entity_id: &str,
) -> ProviderResult<Option<String>> {
    let tags = store.select_by_type_and_id(entity_type, entity_id)?;
    Ok(tags.value_of("name").map(str::to_string))
}

/// Pre-delete scan for entities that reference the target by tag.
#[derive(Debug, Clone, Copy)]
pub struct DependencyCheck {
    pub target_type: EntityType,
    pub reference_key: &'static str,
    pub dependent_types: &'static [EntityType],
}

impl DependencyCheck {
    /// Fails with [`ProviderError::Dependency`] for the first dependent type
    /// with any referencing tag. Never touches remote state.
    pub fn run(&self, store: &dyn TagStore, target_id: &str) -> ProviderResult<()> {
        for dependent_type in self.dependent_types {
            let references = store
                .select_by_type(*dependent_type)?
                .with_key(self.reference_key)
                .with_value(target_id);
            if !references.is_empty() {
                return Err(ProviderError::Dependency {
                    entity_type: self.target_type,
                    entity_id: target_id.to_string(),
                    dependent_type: *dependent_type,
                    dependent_ids: references.entity_ids(),
                });
            }
        }
        Ok(())
    }
}

/// Names of every cluster owned by `instance`.
pub fn instance_clusters(ecs: &dyn EcsApi, instance: &str) -> ProviderResult<Vec<String>> {
    let arns = drain_pages(|token| ecs.list_clusters(token))?;
    Ok(arns
        .iter()
        .map(|arn| naming::name_from_arn(arn))
        .filter(|name| naming::has_instance_prefix(instance, name))
        .map(str::to_string)
        .collect())
}

pub fn find_security_group(
    ec2: &dyn Ec2Api,
    group_name: &str,
) -> ProviderResult<Option<SecurityGroup>> {
    let groups = ec2.describe_security_groups_by_name(group_name)?;
    Ok(groups.into_iter().find(|g| g.group_name == group_name))
}

/// Looks up a security group by exact name.
pub fn read_security_group(ec2: &dyn Ec2Api, group_name: &str) -> ProviderResult<SecurityGroup> {
    find_security_group(ec2, group_name)?.ok_or_else(|| {
        RemoteError::new(
            DOES_NOT_EXIST,
            format!("Security group '{}' does not exist", group_name),
        )
        .into()
    })
}

/// Reads a group that was just created, waiting for it to become visible.
pub fn read_new_security_group(
    ec2: &dyn Ec2Api,
    group_name: &str,
) -> ProviderResult<SecurityGroup> {
    let mut found = None;
    retry::retry::<ProviderError, _>(
        || match find_security_group(ec2, group_name)? {
            Some(group) => {
                found = Some(group);
                Ok(false)
            }
            None => {
                tracing::debug!(group_name, "Security group not visible yet, will retry");
                Ok(true)
            }
        },
        vec![
            with_timeout(CONSISTENCY_TIMEOUT),
            with_delay(CONSISTENCY_DELAY),
        ],
    )
    .map_err(|e| ProviderError::from_retry(&format!("security group '{}'", group_name), e))?;

    found.ok_or_else(|| {
        ProviderError::EventualConsistency(format!("security group '{}' never appeared", group_name))
    })
}

/// Deletes a security group by name and waits until it is gone.
///
/// A missing group is success. `DependencyViolation` is retried until the
/// consistency timeout.
pub fn delete_security_group(ec2: &dyn Ec2Api, group_name: &str) -> ProviderResult<()> {
    let Some(group) = find_security_group(ec2, group_name)? else {
        tracing::debug!(group_name, "Security group already absent");
        return Ok(());
    };

    retry::retry::<ProviderError, _>(
        || match ec2.delete_security_group(&group.group_id) {
            Ok(()) => Ok(false),
            Err(err) if err.matches_any(absent::SECURITY_GROUP) => Ok(false),
            Err(err) if err.has_code("DependencyViolation") => {
                tracing::debug!(group_name, error = %err, "Security group still in use, will retry");
                Ok(true)
            }
            Err(err) => Err(ProviderError::from(err)),
        },
        vec![
            with_timeout(CONSISTENCY_TIMEOUT),
            with_delay(CONSISTENCY_DELAY),
        ],
    )
    .map_err(|e| ProviderError::from_retry(&format!("delete security group '{}'", group_name), e))?;

    retry::retry::<ProviderError, _>(
        || Ok(find_security_group(ec2, group_name)?.is_some()),
        vec![
            with_timeout(CONSISTENCY_TIMEOUT),
            with_delay(CONSISTENCY_DELAY),
        ],
    )
    .map_err(|e| ProviderError::from_retry(&format!("security group '{}' removal", group_name), e))
}
