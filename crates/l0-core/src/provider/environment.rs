//! Environment provider.
//!
//! An environment is a security group, an ECS cluster and, for static
//! environments, a launch configuration plus autoscaling group. All four
//! share the name `l0-<instance>-<id>` (the group adds `-env`).

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::{debug, info, warn};

use super::common::{self, DependencyCheck, absent, ignore_absent};
use super::{EntityProvider, ProviderContext};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{
    CreateEnvironmentRequest, Environment, EnvironmentSummary, EnvironmentType, OperatingSystem,
    UpdateEnvironmentRequest,
};
use crate::naming;
use crate::remote::{
    AutoScalingGroup, AutoScalingGroupSize, IngressRule, LaunchConfiguration, RemoteError,
    SecurityGroup, drain_pages,
};
use crate::tag::{Tag, Tags};
use crate::types::EntityType;

/// Key prefix for link tags; the full key is `link:<other environment id>`.
pub const LINK_KEY_PREFIX: &str = "link:";

const DEPENDENCIES: DependencyCheck = DependencyCheck {
    target_type: EntityType::Environment,
    reference_key: "environment_id",
    dependent_types: &[EntityType::LoadBalancer, EntityType::Service, EntityType::Task],
};

const LINUX_USER_DATA: &str = r#"#!/bin/bash
echo ECS_CLUSTER={{cluster}} >> /etc/ecs/ecs.config
echo ECS_ENGINE_AUTH_TYPE=dockercfg >> /etc/ecs/ecs.config
yum install -y aws-cli awslogs jq
aws s3 cp s3://{{s3_bucket}}/bootstrap/dockercfg dockercfg
cfg=$(cat dockercfg)
echo ECS_ENGINE_AUTH_DATA=$cfg >> /etc/ecs/ecs.config
docker pull amazon/amazon-ecs-agent:latest
start ecs
"#;

const WINDOWS_USER_DATA: &str = r#"<powershell>
Import-Module ECSTools
Read-S3Object -BucketName {{s3_bucket}} -Key bootstrap/dockercfg -File dockercfg.json
$dockercfg = [IO.File]::ReadAllText("dockercfg.json")
[Environment]::SetEnvironmentVariable("ECS_ENGINE_AUTH_TYPE", "dockercfg", "Machine")
[Environment]::SetEnvironmentVariable("ECS_ENGINE_AUTH_DATA", $dockercfg, "Machine")
Initialize-ECSAgent -Cluster "{{cluster}}" -EnableTaskIAMRole
</powershell>
<persist>true</persist>
"#;

/// Substitutes `{{cluster}}` and `{{s3_bucket}}` and base64-encodes the result.
pub fn render_user_data(template: &str, cluster: &str, s3_bucket: &str) -> String {
    let rendered = template
        .replace("{{cluster}}", cluster)
        .replace("{{s3_bucket}}", s3_bucket);
    STANDARD.encode(rendered)
}

pub fn default_user_data_template(os: OperatingSystem) -> &'static str {
    match os {
        OperatingSystem::Linux => LINUX_USER_DATA,
        OperatingSystem::Windows => WINDOWS_USER_DATA,
    }
}

pub fn link_key(other_environment_id: &str) -> String {
    format!("{}{}", LINK_KEY_PREFIX, other_environment_id)
}

fn is_link(tag: &Tag) -> bool {
    tag.key.starts_with(LINK_KEY_PREFIX)
}

/// Works out the new `(min, max)` for a sparse scale update.
///
/// A bound given alone drags the other along when they would cross. Both
/// given with `min > max` is rejected.
pub fn reconcile_scale(
    current_min: i64,
    current_max: i64,
    requested_min: Option<i64>,
    requested_max: Option<i64>,
) -> ProviderResult<(i64, i64)> {
    if requested_min.is_some_and(|v| v < 0) || requested_max.is_some_and(|v| v < 0) {
        return Err(ProviderError::validation("Scale cannot be negative"));
    }

    match (requested_min, requested_max) {
        (Some(min), Some(max)) if min > max => Err(ProviderError::validation(format!(
            "MinScale ({}) cannot be greater than MaxScale ({})",
            min, max
        ))),
        (Some(min), Some(max)) => Ok((min, max)),
        (Some(min), None) => Ok((min, current_max.max(min))),
        (None, Some(max)) => Ok((current_min.min(max), max)),
        (None, None) => Ok((current_min, current_max)),
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentProvider {
    context: ProviderContext,
}

impl EnvironmentProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    fn sg_name(&self, environment_id: &str) -> String {
        naming::environment_sg_name(self.context.instance(), environment_id)
    }

    /// Creates every remote resource for a new environment and returns its ID.
    pub fn create(&self, req: &CreateEnvironmentRequest) -> ProviderResult<String> {
        req.validate()?;
        let config = &self.context.config;
        let cloud = &self.context.cloud;

        let ami_id = match (&req.ami_id, req.operating_system) {
            (Some(ami), _) => ami.clone(),
            (None, OperatingSystem::Linux) => config.linux_ami().to_string(),
            (None, OperatingSystem::Windows) => config.windows_ami().to_string(),
        };
        if req.environment_type == EnvironmentType::Static && ami_id.is_empty() {
            return Err(ProviderError::validation(format!(
                "No AMI configured for operating system '{}'",
                req.operating_system
            )));
        }

        let environment_id = self.context.ids.generate(&req.environment_name);
        let fq = self.context.fq(&environment_id);
        let sg_name = self.sg_name(&environment_id);
        info!(
            environment_id = %environment_id,
            name = %req.environment_name,
            environment_type = %req.environment_type,
            "Creating environment"
        );

        cloud.ec2.create_security_group(
            &sg_name,
            &format!("SG for l0 environment {}", environment_id),
            config.vpc_id(),
        )?;
        let group = common::read_new_security_group(cloud.ec2.as_ref(), &sg_name)?;
        cloud
            .ec2
            .authorize_ingress(&group.group_id, &IngressRule::all_from_group(&group.group_id))?;

        if req.environment_type == EnvironmentType::Static {
            let template = req
                .user_data
                .as_deref()
                .unwrap_or_else(|| default_user_data_template(req.operating_system));
            let instance_type = req
                .instance_type
                .clone()
                .unwrap_or_else(|| config.default_instance_type().to_string());

            cloud
                .autoscaling
                .create_launch_configuration(&LaunchConfiguration {
                    name: fq.clone(),
                    image_id: ami_id,
                    instance_type,
                    security_groups: vec![group.group_id.clone()],
                    iam_instance_profile: config.instance_profile().to_string(),
                    key_name: config.ssh_key_pair().to_string(),
                    user_data: render_user_data(template, &fq, config.s3_bucket()),
                })?;

            cloud
                .autoscaling
                .create_auto_scaling_group(&AutoScalingGroup {
                    name: fq.clone(),
                    launch_configuration_name: fq.clone(),
                    min_size: req.scale,
                    max_size: req.scale,
                    desired_capacity: req.scale,
                    vpc_zone_identifier: config.private_subnets().join(","),
                    instance_ids: Vec::new(),
                    tags: vec![("Name".to_string(), fq.clone())],
                })?;
        }

        cloud.ecs.create_cluster(&fq)?;

        common::insert_tags(
            self.context.store.as_ref(),
            vec![
                Tag::new(
                    EntityType::Environment,
                    &environment_id,
                    "name",
                    &req.environment_name,
                ),
                Tag::new(
                    EntityType::Environment,
                    &environment_id,
                    "os",
                    req.operating_system.as_str(),
                ),
                Tag::new(
                    EntityType::Environment,
                    &environment_id,
                    "type",
                    req.environment_type.as_str(),
                ),
            ],
        )?;

        Ok(environment_id)
    }

    pub fn read(&self, environment_id: &str) -> ProviderResult<Environment> {
        let tags = common::require_tags(
            self.context.store.as_ref(),
            EntityType::Environment,
            environment_id,
        )?;
        let (name, environment_type, operating_system) = describe_tags(&tags, environment_id)?;
        let group =
            common::read_security_group(self.context.cloud.ec2.as_ref(), &self.sg_name(environment_id))?;

        let mut environment = Environment {
            environment_id: environment_id.to_string(),
            environment_name: name,
            environment_type,
            operating_system,
            security_group_id: group.group_id,
            instance_type: None,
            ami_id: None,
            min_scale: 0,
            current_scale: 0,
            max_scale: 0,
            links: tags
                .filter(is_link)
                .iter()
                .map(|tag| tag.value.clone())
                .collect(),
        };

        if environment_type == EnvironmentType::Static {
            let group = self.read_auto_scaling_group(environment_id)?;
            environment.min_scale = group.min_size;
            environment.max_scale = group.max_size;
            environment.current_scale = group.desired_capacity;

            let launch_config = self.read_launch_configuration(&group.launch_configuration_name)?;
            environment.instance_type = Some(launch_config.instance_type);
            environment.ami_id = Some(launch_config.image_id);
        }

        Ok(environment)
    }

    /// Every cluster under this instance's prefix that has tags.
    pub fn list(&self) -> ProviderResult<Vec<EnvironmentSummary>> {
        let store = self.context.store.as_ref();
        let mut summaries = Vec::new();
        for environment_id in self.list_ids()? {
            let tags = store.select_by_type_and_id(EntityType::Environment, &environment_id)?;
            if tags.is_empty() {
                debug!(environment_id = %environment_id, "Skipping untagged cluster");
                continue;
            }
            let (name, environment_type, operating_system) =
                describe_tags(&tags, &environment_id)?;
            summaries.push(EnvironmentSummary {
                environment_id,
                environment_name: name,
                environment_type,
                operating_system,
            });
        }
        Ok(summaries)
    }

    pub fn update(
        &self,
        environment_id: &str,
        req: &UpdateEnvironmentRequest,
    ) -> ProviderResult<()> {
        let tags = common::require_tags(
            self.context.store.as_ref(),
            EntityType::Environment,
            environment_id,
        )?;
        if req.is_empty() {
            return Ok(());
        }

        let (_, environment_type, _) = describe_tags(&tags, environment_id)?;
        if environment_type == EnvironmentType::Dynamic {
            return Err(ProviderError::validation(
                "Cannot scale a dynamic environment",
            ));
        }

        let group = self.read_auto_scaling_group(environment_id)?;
        let (min, max) =
            reconcile_scale(group.min_size, group.max_size, req.min_scale, req.max_scale)?;
        let desired = group.desired_capacity.clamp(min, max);

        info!(environment_id, min, max, desired, "Updating environment scale");
        self.context.cloud.autoscaling.update_auto_scaling_group(
            &group.name,
            &AutoScalingGroupSize {
                min_size: Some(min),
                max_size: Some(max),
                desired_capacity: Some(desired),
            },
        )?;
        Ok(())
    }

    /// Tears down an environment. Refuses while anything still lives in it.
    pub fn delete(&self, environment_id: &str) -> ProviderResult<()> {
        let store = self.context.store.as_ref();
        let cloud = &self.context.cloud;
        DEPENDENCIES.run(store, environment_id)?;

        let fq = self.context.fq(environment_id);
        info!(environment_id, "Deleting environment");

        for other in self.linked_environments(environment_id)? {
            self.unlink(environment_id, &other)?;
        }

        ignore_absent(
            cloud.autoscaling.delete_auto_scaling_group(&fq, true),
            absent::AUTO_SCALING_GROUP,
            "autoscaling group",
        )?;
        ignore_absent(
            cloud.autoscaling.delete_launch_configuration(&fq),
            absent::LAUNCH_CONFIGURATION,
            "launch configuration",
        )?;
        common::delete_security_group(cloud.ec2.as_ref(), &self.sg_name(environment_id))?;
        ignore_absent(cloud.ecs.delete_cluster(&fq), absent::CLUSTER, "cluster")?;

        let removed = common::delete_entity_tags(store, EntityType::Environment, environment_id)?;
        debug!(environment_id, removed, "Removed environment tags");
        Ok(())
    }

    /// Allows all traffic between two environments, in both directions.
    pub fn link(&self, source_id: &str, dest_id: &str) -> ProviderResult<()> {
        if source_id == dest_id {
            return Err(ProviderError::validation(
                "Cannot link an environment to itself",
            ));
        }
        let store = self.context.store.as_ref();
        common::require_tags(store, EntityType::Environment, source_id)?;
        common::require_tags(store, EntityType::Environment, dest_id)?;

        let ec2 = self.context.cloud.ec2.as_ref();
        let source = common::read_security_group(ec2, &self.sg_name(source_id))?;
        let dest = common::read_security_group(ec2, &self.sg_name(dest_id))?;

        info!(source_id, dest_id, "Linking environments");
        self.authorize_from(&source, &dest)?;
        self.authorize_from(&dest, &source)?;

        common::insert_tags(
            store,
            vec![
                Tag::new(EntityType::Environment, source_id, link_key(dest_id), dest_id),
                Tag::new(EntityType::Environment, dest_id, link_key(source_id), source_id),
            ],
        )
    }

    /// Removes a link in both directions. Missing rules, groups or tags are
    /// not an error.
    pub fn unlink(&self, source_id: &str, dest_id: &str) -> ProviderResult<()> {
        let ec2 = self.context.cloud.ec2.as_ref();
        let source = common::find_security_group(ec2, &self.sg_name(source_id))?;
        let dest = common::find_security_group(ec2, &self.sg_name(dest_id))?;

        info!(source_id, dest_id, "Unlinking environments");
        if let (Some(source), Some(dest)) = (&source, &dest) {
            self.revoke_from(source, dest)?;
            self.revoke_from(dest, source)?;
        }

        let store = self.context.store.as_ref();
        store.delete(EntityType::Environment, source_id, &link_key(dest_id))?;
        store.delete(EntityType::Environment, dest_id, &link_key(source_id))?;
        Ok(())
    }

    /// Environments linked to `environment_id` from either side.
    fn linked_environments(&self, environment_id: &str) -> ProviderResult<Vec<String>> {
        let environments = self
            .context
            .store
            .select_by_type(EntityType::Environment)?;
        let mut linked: Vec<String> = environments
            .with_id(environment_id)
            .filter(is_link)
            .iter()
            .map(|tag| tag.value.clone())
            .collect();
        linked.extend(
            environments
                .filter(is_link)
                .with_value(environment_id)
                .entity_ids(),
        );
        linked.sort();
        linked.dedup();
        Ok(linked)
    }

    /// Lets members of `from` reach `group`. An existing rule counts as done.
    fn authorize_from(&self, group: &SecurityGroup, from: &SecurityGroup) -> ProviderResult<()> {
        let rule = IngressRule::all_from_group(&from.group_id);
        match self
            .context
            .cloud
            .ec2
            .authorize_ingress(&group.group_id, &rule)
        {
            Ok(()) => Ok(()),
            Err(err) if err.has_code("InvalidPermission.Duplicate") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn revoke_from(&self, group: &SecurityGroup, from: &SecurityGroup) -> ProviderResult<()> {
        for rule in &group.ingress {
            if rule.source_group() != Some(from.group_id.as_str()) {
                continue;
            }
            match self
                .context
                .cloud
                .ec2
                .revoke_ingress(&group.group_id, rule)
            {
                Ok(()) => {}
                Err(err) if err.has_code("InvalidPermission.NotFound") => {
                    debug!(group_id = %group.group_id, "Ingress rule already revoked");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    pub fn read_auto_scaling_group(&self, environment_id: &str) -> ProviderResult<AutoScalingGroup> {
        let name = self.context.fq(environment_id);
        self.context
            .cloud
            .autoscaling
            .describe_auto_scaling_groups(&name)?
            .into_iter()
            .find(|g| g.name == name)
            .ok_or_else(|| {
                RemoteError::new(
                    common::DOES_NOT_EXIST,
                    format!("Autoscaling group '{}' does not exist", name),
                )
                .into()
            })
    }

    fn read_launch_configuration(&self, name: &str) -> ProviderResult<LaunchConfiguration> {
        self.context
            .cloud
            .autoscaling
            .describe_launch_configurations(name)?
            .into_iter()
            .find(|lc| lc.name == name)
            .ok_or_else(|| {
                RemoteError::new(
                    common::DOES_NOT_EXIST,
                    format!("Launch configuration '{}' does not exist", name),
                )
                .into()
            })
    }
}

fn describe_tags(
    tags: &Tags,
    environment_id: &str,
) -> ProviderResult<(String, EnvironmentType, OperatingSystem)> {
    let name = common::required_value(tags, EntityType::Environment, environment_id, "name")?;
    let environment_type = match tags.value_of("type") {
        Some(value) => value.parse()?,
        None => EnvironmentType::default(),
    };
    let operating_system = match tags.value_of("os") {
        Some(value) => value.parse()?,
        None => {
            warn!(environment_id, "Environment has no os tag, assuming linux");
            OperatingSystem::default()
        }
    };
    Ok((name, environment_type, operating_system))
}

impl EntityProvider for EnvironmentProvider {
    fn entity_type(&self) -> EntityType {
        EntityType::Environment
    }

    fn delete(&self, entity_id: &str) -> ProviderResult<()> {
        EnvironmentProvider::delete(self, entity_id)
    }

    fn list_ids(&self) -> ProviderResult<Vec<String>> {
        let instance = self.context.instance();
        let arns = drain_pages(|token| self.context.cloud.ecs.list_clusters(token))?;
        let mut ids: Vec<String> = arns
            .iter()
            .filter_map(|arn| naming::parse_entity_id(instance, naming::name_from_arn(arn)))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
