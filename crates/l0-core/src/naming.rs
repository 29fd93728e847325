//! Deterministic remote resource names.
//!
//! Every remote resource the control plane creates is named
//! `l0-<instance>-<entity_id>[-<suffix>]`, so a resource can always be found
//! again from the entity ID alone and listings can be filtered down to the
//! resources owned by the running instance.

/// Suffix for an environment's own security group.
pub const ENVIRONMENT_SG_SUFFIX: &str = "env";
/// Suffix for a load balancer's security group and IAM role.
pub const LOAD_BALANCER_SUFFIX: &str = "lb";

const PREFIX_ROOT: &str = "l0";

/// `l0-<instance>-`
pub fn instance_prefix(instance: &str) -> String {
    format!("{}-{}-", PREFIX_ROOT, instance)
}

pub fn has_instance_prefix(instance: &str, name: &str) -> bool {
    name.starts_with(&instance_prefix(instance))
}

/// Fully qualified name of an entity's primary resource (cluster, autoscaling
/// group, launch configuration, load balancer, task definition family).
pub fn fq_name(instance: &str, entity_id: &str) -> String {
    resource_name(instance, entity_id, None)
}

pub fn resource_name(instance: &str, entity_id: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{}{}-{}", instance_prefix(instance), entity_id, suffix),
        None => format!("{}{}", instance_prefix(instance), entity_id),
    }
}

/// Inverse of [`fq_name`]. Names outside this instance yield `None`.
pub fn parse_entity_id(instance: &str, name: &str) -> Option<String> {
    name.strip_prefix(&instance_prefix(instance))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Inverse of [`resource_name`] with a suffix.
pub fn parse_entity_id_with_suffix(instance: &str, name: &str, suffix: &str) -> Option<String> {
    parse_entity_id(instance, name)?
        .strip_suffix(&format!("-{}", suffix))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn environment_sg_name(instance: &str, environment_id: &str) -> String {
    resource_name(instance, environment_id, Some(ENVIRONMENT_SG_SUFFIX))
}

pub fn load_balancer_sg_name(instance: &str, load_balancer_id: &str) -> String {
    resource_name(instance, load_balancer_id, Some(LOAD_BALANCER_SUFFIX))
}

pub fn load_balancer_role_name(instance: &str, load_balancer_id: &str) -> String {
    resource_name(instance, load_balancer_id, Some(LOAD_BALANCER_SUFFIX))
}

/// Last path segment of an ARN: `arn:aws:ecs:region:acct:cluster/name` -> `name`.
pub fn name_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// Splits `.../family:revision` out of a task definition ARN.
pub fn task_definition_family_revision(arn: &str) -> Option<(&str, &str)> {
    let last = name_from_arn(arn);
    let (family, revision) = last.rsplit_once(':')?;
    if family.is_empty() || revision.is_empty() {
        return None;
    }
    Some((family, revision))
}
