//! Load balancer provider.
//!
//! A load balancer owns a classic ELB named `l0-<instance>-<id>`, a security
//! group and an IAM role (both suffixed `-lb`). The role is what the
//! container service assumes to register instances with the ELB.

use serde_json::json;
use tracing::{debug, info};

use super::common::{self, DependencyCheck, absent, ignore_absent};
use super::{EntityProvider, ProviderContext};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{
    CLASSIC_LOAD_BALANCER_TYPE, CreateLoadBalancerRequest, HealthCheck, LoadBalancer,
    LoadBalancerSummary, Port, UpdateLoadBalancerRequest,
};
use crate::naming;
use crate::remote::{
    CreateLoadBalancerInput, ElbHealthCheck, ErrorSignature, IngressRule, IngressSource, Listener,
    LoadBalancerDescription, RemoteError, drain_pages,
};
use crate::tag::Tag;
use crate::types::EntityType;

const DEPENDENCIES: DependencyCheck = DependencyCheck {
    target_type: EntityType::LoadBalancer,
    reference_key: "load_balancer_id",
    dependent_types: &[EntityType::Service],
};

const SCHEME_PUBLIC: &str = "internet-facing";
const SCHEME_PRIVATE: &str = "internal";

/// Trust policy letting the container service assume the load balancer role.
pub fn assume_role_policy() -> String {
    json!({
        "Version": "2008-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": ["ecs.amazonaws.com"] },
            "Action": ["sts:AssumeRole"]
        }]
    })
    .to_string()
}

/// Inline policy scoped to one ELB.
pub fn load_balancer_role_policy(region: &str, account_id: &str, elb_name: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["ec2:AuthorizeSecurityGroupIngress", "ec2:Describe*"],
                "Resource": ["*"]
            },
            {
                "Effect": "Allow",
                "Action": [
                    "elasticloadbalancing:DeregisterInstancesFromLoadBalancer",
                    "elasticloadbalancing:Describe*",
                    "elasticloadbalancing:RegisterInstancesWithLoadBalancer"
                ],
                "Resource": [format!(
                    "arn:aws:elasticloadbalancing:{}:{}:loadbalancer/{}",
                    region, account_id, elb_name
                )]
            }
        ]
    })
    .to_string()
}

impl From<&HealthCheck> for ElbHealthCheck {
    fn from(health_check: &HealthCheck) -> Self {
        ElbHealthCheck {
            target: health_check.target.clone(),
            interval: health_check.interval,
            timeout: health_check.timeout,
            healthy_threshold: health_check.healthy_threshold,
            unhealthy_threshold: health_check.unhealthy_threshold,
        }
    }
}

impl From<ElbHealthCheck> for HealthCheck {
    fn from(health_check: ElbHealthCheck) -> Self {
        HealthCheck {
            target: health_check.target,
            interval: health_check.interval,
            timeout: health_check.timeout,
            healthy_threshold: health_check.healthy_threshold,
            unhealthy_threshold: health_check.unhealthy_threshold,
        }
    }
}

fn port_from_listener(listener: &Listener) -> ProviderResult<Port> {
    Ok(Port {
        host_port: listener.load_balancer_port,
        container_port: listener.instance_port,
        protocol: listener.protocol.parse()?,
        certificate: listener.ssl_certificate_id.clone(),
    })
}

#[derive(Debug, Clone)]
pub struct LoadBalancerProvider {
    context: ProviderContext,
}

impl LoadBalancerProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    fn sg_name(&self, load_balancer_id: &str) -> String {
        naming::load_balancer_sg_name(self.context.instance(), load_balancer_id)
    }

    fn role_name(&self, load_balancer_id: &str) -> String {
        naming::load_balancer_role_name(self.context.instance(), load_balancer_id)
    }

    pub fn create(&self, req: &CreateLoadBalancerRequest) -> ProviderResult<String> {
        req.validate()?;
        let config = &self.context.config;
        let cloud = &self.context.cloud;

        let ports = if req.ports.is_empty() {
            vec![config.default_port()]
        } else {
            req.ports.clone()
        };
        let health_check = req
            .health_check
            .clone()
            .unwrap_or_else(|| config.default_health_check());
        let listeners = self.listeners_for(&ports)?;

        let environment_group = common::read_security_group(
            cloud.ec2.as_ref(),
            &naming::environment_sg_name(self.context.instance(), &req.environment_id),
        )?;

        let load_balancer_id = self.context.ids.generate(&req.load_balancer_name);
        let fq = self.context.fq(&load_balancer_id);
        let sg_name = self.sg_name(&load_balancer_id);
        let role_name = self.role_name(&load_balancer_id);
        info!(
            load_balancer_id = %load_balancer_id,
            name = %req.load_balancer_name,
            environment_id = %req.environment_id,
            "Creating load balancer"
        );

        cloud.ec2.create_security_group(
            &sg_name,
            &format!("SG for l0 load balancer {}", load_balancer_id),
            config.vpc_id(),
        )?;
        let group = common::read_new_security_group(cloud.ec2.as_ref(), &sg_name)?;
        for port in &ports {
            cloud
                .ec2
                .authorize_ingress(&group.group_id, &IngressRule::tcp_from_anywhere(port.host_port))?;
        }

        cloud.iam.create_role(&role_name, &assume_role_policy())?;
        cloud.iam.put_role_policy(
            &role_name,
            &role_name,
            &load_balancer_role_policy(config.region(), config.account_id(), &fq),
        )?;

        let (scheme, subnets) = if req.is_public {
            (SCHEME_PUBLIC, config.public_subnets())
        } else {
            (SCHEME_PRIVATE, config.private_subnets())
        };
        let dns_name = cloud.elb.create_load_balancer(&CreateLoadBalancerInput {
            name: fq.clone(),
            scheme: scheme.to_string(),
            security_groups: vec![group.group_id.clone(), environment_group.group_id],
            subnets: subnets.to_vec(),
            listeners,
        })?;
        debug!(load_balancer_id = %load_balancer_id, dns_name = %dns_name, "Load balancer created");

        cloud
            .elb
            .configure_health_check(&fq, &ElbHealthCheck::from(&health_check))?;

        common::insert_tags(
            self.context.store.as_ref(),
            vec![
                Tag::new(
                    EntityType::LoadBalancer,
                    &load_balancer_id,
                    "name",
                    &req.load_balancer_name,
                ),
                Tag::new(
                    EntityType::LoadBalancer,
                    &load_balancer_id,
                    "environment_id",
                    &req.environment_id,
                ),
                Tag::new(
                    EntityType::LoadBalancer,
                    &load_balancer_id,
                    "type",
                    CLASSIC_LOAD_BALANCER_TYPE,
                ),
            ],
        )?;

        Ok(load_balancer_id)
    }

    pub fn read(&self, load_balancer_id: &str) -> ProviderResult<LoadBalancer> {
        let store = self.context.store.as_ref();
        let tags = common::require_tags(store, EntityType::LoadBalancer, load_balancer_id)?;
        let name =
            common::required_value(&tags, EntityType::LoadBalancer, load_balancer_id, "name")?;
        let environment_id = common::required_value(
            &tags,
            EntityType::LoadBalancer,
            load_balancer_id,
            "environment_id",
        )?;

        let description = self.describe(load_balancer_id)?;
        let ports = description
            .listeners
            .iter()
            .map(port_from_listener)
            .collect::<ProviderResult<Vec<_>>>()?;

        Ok(LoadBalancer {
            load_balancer_id: load_balancer_id.to_string(),
            load_balancer_name: name,
            load_balancer_type: tags
                .value_of("type")
                .unwrap_or(CLASSIC_LOAD_BALANCER_TYPE)
                .to_string(),
            environment_name: common::lookup_name(store, EntityType::Environment, &environment_id)?,
            environment_id,
            is_public: description.scheme == SCHEME_PUBLIC,
            url: description.dns_name,
            ports,
            health_check: description.health_check.into(),
            service_ids: store
                .select_by_type(EntityType::Service)?
                .with_key("load_balancer_id")
                .with_value(load_balancer_id)
                .entity_ids(),
        })
    }

    pub fn list(&self) -> ProviderResult<Vec<LoadBalancerSummary>> {
        let store = self.context.store.as_ref();
        let mut summaries = Vec::new();
        for load_balancer_id in self.list_ids()? {
            let tags = store.select_by_type_and_id(EntityType::LoadBalancer, &load_balancer_id)?;
            let (Some(name), Some(environment_id)) =
                (tags.value_of("name"), tags.value_of("environment_id"))
            else {
                debug!(load_balancer_id = %load_balancer_id, "Skipping untagged load balancer");
                continue;
            };
            summaries.push(LoadBalancerSummary {
                load_balancer_name: name.to_string(),
                environment_name: common::lookup_name(
                    store,
                    EntityType::Environment,
                    environment_id,
                )?,
                environment_id: environment_id.to_string(),
                load_balancer_id,
            });
        }
        Ok(summaries)
    }

    /// Applies ports and health check independently; absent fields are left alone.
    pub fn update(
        &self,
        load_balancer_id: &str,
        req: &UpdateLoadBalancerRequest,
    ) -> ProviderResult<()> {
        common::require_tags(
            self.context.store.as_ref(),
            EntityType::LoadBalancer,
            load_balancer_id,
        )?;
        req.validate()?;
        let fq = self.context.fq(load_balancer_id);

        if let Some(ports) = &req.ports {
            info!(load_balancer_id, ports = ports.len(), "Replacing load balancer ports");
            self.replace_ports(load_balancer_id, &fq, ports)?;
        }

        if let Some(health_check) = &req.health_check {
            info!(load_balancer_id, target = %health_check.target, "Updating health check");
            self.context
                .cloud
                .elb
                .configure_health_check(&fq, &ElbHealthCheck::from(health_check))?;
        }

        Ok(())
    }

    fn replace_ports(&self, load_balancer_id: &str, fq: &str, ports: &[Port]) -> ProviderResult<()> {
        let cloud = &self.context.cloud;
        let listeners = self.listeners_for(ports)?;
        let current = self.describe(load_balancer_id)?;

        let old_ports: Vec<i64> = current
            .listeners
            .iter()
            .map(|listener| listener.load_balancer_port)
            .collect();
        if !old_ports.is_empty() {
            cloud.elb.delete_listeners(fq, &old_ports)?;
        }
        cloud.elb.create_listeners(fq, &listeners)?;

        let group = common::read_security_group(cloud.ec2.as_ref(), &self.sg_name(load_balancer_id))?;
        for rule in &group.ingress {
            if matches!(rule.source, IngressSource::Cidr(_)) {
                ignore_absent(
                    cloud.ec2.revoke_ingress(&group.group_id, rule),
                    &[ErrorSignature::Code("InvalidPermission.NotFound")],
                    "ingress rule",
                )?;
            }
        }
        for port in ports {
            match cloud
                .ec2
                .authorize_ingress(&group.group_id, &IngressRule::tcp_from_anywhere(port.host_port))
            {
                Ok(()) => {}
                Err(err) if err.has_code("InvalidPermission.Duplicate") => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Tears down a load balancer. Refuses while a service still uses it.
    pub fn delete(&self, load_balancer_id: &str) -> ProviderResult<()> {
        let store = self.context.store.as_ref();
        let cloud = &self.context.cloud;
        DEPENDENCIES.run(store, load_balancer_id)?;

        let fq = self.context.fq(load_balancer_id);
        let role_name = self.role_name(load_balancer_id);
        info!(load_balancer_id, "Deleting load balancer");

        ignore_absent(
            cloud.elb.delete_load_balancer(&fq),
            absent::LOAD_BALANCER,
            "load balancer",
        )?;
        ignore_absent(
            cloud.iam.delete_role_policy(&role_name, &role_name),
            absent::IAM,
            "role policy",
        )?;
        ignore_absent(cloud.iam.delete_role(&role_name), absent::IAM, "role")?;
        common::delete_security_group(cloud.ec2.as_ref(), &self.sg_name(load_balancer_id))?;

        common::delete_entity_tags(store, EntityType::LoadBalancer, load_balancer_id)?;
        Ok(())
    }

    pub fn describe(&self, load_balancer_id: &str) -> ProviderResult<LoadBalancerDescription> {
        let fq = self.context.fq(load_balancer_id);
        let page = self
            .context
            .cloud
            .elb
            .describe_load_balancers(std::slice::from_ref(&fq), None)?;
        page.items
            .into_iter()
            .find(|description| description.name == fq)
            .ok_or_else(|| {
                RemoteError::new(
                    "LoadBalancerNotFound",
                    format!("Load balancer '{}' does not exist", fq),
                )
                .into()
            })
    }

    fn listeners_for(&self, ports: &[Port]) -> ProviderResult<Vec<Listener>> {
        ports
            .iter()
            .map(|port| {
                let ssl_certificate_id = match &port.certificate {
                    Some(certificate) => Some(self.resolve_certificate(certificate)?),
                    None => None,
                };
                Ok(Listener {
                    protocol: port.protocol.as_str().to_ascii_uppercase(),
                    load_balancer_port: port.host_port,
                    instance_protocol: port.protocol.instance_protocol().as_str().to_ascii_uppercase(),
                    instance_port: port.container_port,
                    ssl_certificate_id,
                })
            })
            .collect()
    }

    /// ARNs pass through; anything else is looked up by certificate name.
    fn resolve_certificate(&self, certificate: &str) -> ProviderResult<String> {
        if certificate.starts_with("arn:") {
            return Ok(certificate.to_string());
        }
        let certificates =
            drain_pages(|marker| self.context.cloud.iam.list_server_certificates(marker))?;
        certificates
            .into_iter()
            .find(|c| c.name == certificate)
            .map(|c| c.arn)
            .ok_or_else(|| {
                ProviderError::validation(format!("Certificate '{}' does not exist", certificate))
            })
    }
}

impl EntityProvider for LoadBalancerProvider {
    fn entity_type(&self) -> EntityType {
        EntityType::LoadBalancer
    }

    fn delete(&self, entity_id: &str) -> ProviderResult<()> {
        LoadBalancerProvider::delete(self, entity_id)
    }

    fn list_ids(&self) -> ProviderResult<Vec<String>> {
        let instance = self.context.instance();
        let descriptions = drain_pages(|marker| {
            self.context.cloud.elb.describe_load_balancers(&[], marker)
        })?;
        let mut ids: Vec<String> = descriptions
            .iter()
            .filter_map(|description| naming::parse_entity_id(instance, &description.name))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_policy_is_scoped_to_one_load_balancer() {
        let policy = load_balancer_role_policy("us-west-2", "123456789012", "l0-prod-lb1");
        assert!(policy.contains("arn:aws:elasticloadbalancing:us-west-2:123456789012:loadbalancer/l0-prod-lb1"));
    }

    #[test]
    fn listener_protocols_parse_back() {
        let listener = Listener {
            protocol: "HTTPS".into(),
            load_balancer_port: 443,
            instance_protocol: "HTTP".into(),
            instance_port: 8080,
            ssl_certificate_id: Some("arn:aws:iam::1:server-certificate/c".into()),
        };
        let port = port_from_listener(&listener).unwrap();
        assert_eq!(port.host_port, 443);
        assert_eq!(port.container_port, 8080);
        assert_eq!(port.protocol, crate::models::Protocol::Https);
    }
}
