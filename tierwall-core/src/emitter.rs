//! Emitter - Turn a compiled policy into an ordered resource plan
//!
//! The topology is fixed: network lookup, security groups and their rules,
//! load balancer and listener, instance role, launch template, scaling group,
//! capacity provider, cluster, and finally the cluster/capacity-provider
//! binding. Order is derived from the references between descriptors, so
//! adding a descriptor never requires touching the ordering code.

use std::collections::{BTreeMap, HashMap};

use crate::compiler::CompiledPolicy;
use crate::effect::Effect;
use crate::environment::Environment;
use crate::error::CompileError;
use crate::graph::DependencyGraph;
use crate::plan::Plan;
use crate::resource::{Resource, Value};
use crate::rule::{Direction, Peer, Rule};
use crate::topology::{GroupRole, SecurityGroup};

pub const NETWORK: &str = "vpc";
pub const PUBLIC_SUBNETS: &str = "public_subnets";
pub const LOAD_BALANCER: &str = "alb";
pub const LISTENER: &str = "listener";
pub const INSTANCE_ROLE: &str = "instance_role";
pub const LAUNCH_TEMPLATE: &str = "launch_template";
pub const SCALING_GROUP: &str = "asg";
pub const CAPACITY_PROVIDER: &str = "capacity_provider";
pub const CLUSTER: &str = "cluster";
pub const CAPACITY_PROVIDER_BINDING: &str = "cluster_capacity_providers";

const INSTANCE_POLICY: &str = "AmazonSSMManagedInstanceCore";
const INSTANCE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Describe and order every resource for the policy's environment
pub fn emit(policy: &CompiledPolicy) -> Result<Plan, CompileError> {
    order(describe(policy))
}

/// Resource descriptors in declaration order
pub fn describe(policy: &CompiledPolicy) -> Vec<Resource> {
    let env = &policy.environment;
    let mut resources = Vec::new();

    resources.push(
        Resource::new("network_lookup", &env.network_id, NETWORK)
            .with_read_only(true)
            .with_attribute("network_name", Value::string(&env.network_id))
            .with_attribute("cidr_block", Value::string(env.network_cidr.to_string())),
    );
    resources.push(
        Resource::new(
            "subnet_selection",
            env.resource_name("public-subnets"),
            PUBLIC_SUBNETS,
        )
        .with_read_only(true)
        .with_attribute("vpc_id", Value::reference(NETWORK, "id"))
        .with_attribute(
            "subnet_group_name",
            Value::string(&env.public_subnet_selector),
        ),
    );

    for role in GroupRole::ALL {
        if let Some(group) = policy.group(role) {
            let mut resource = security_group(env, group);
            // the fleet's group is only created once the edge group exists
            if role == GroupRole::Compute {
                resource = resource.with_dependency(GroupRole::Edge.binding());
            }
            resources.push(resource);
        }
    }

    let mut counters: HashMap<(&str, Direction), usize> = HashMap::new();
    for rule in &policy.rules {
        // groups are allow-only; anything not allowed is already blocked
        if !rule.is_allow() {
            log::debug!("{}: deny rule on {} emits no permission", env.name, rule.group);
            continue;
        }
        let Some(group) = policy.topology.by_id(&rule.group) else {
            continue;
        };
        let counter = counters
            .entry((group.role.binding(), rule.direction))
            .or_default();
        resources.push(rule_resource(policy, group, rule, *counter));
        *counter += 1;
    }

    resources.push(
        Resource::new("load_balancer", env.resource_name("alb"), LOAD_BALANCER)
            .with_attribute("load_balancer_name", Value::string(env.resource_name("alb")))
            .with_attribute("scheme", Value::string("internet-facing"))
            .with_attribute("internet_facing", Value::Bool(true))
            .with_attribute("subnets", Value::reference(PUBLIC_SUBNETS, "subnet_ids"))
            .with_attribute(
                "security_groups",
                Value::List(vec![Value::reference(
                    GroupRole::Edge.binding(),
                    "group_id",
                )]),
            ),
    );
    resources.push(
        Resource::new(
            "listener",
            env.resource_name(&format!("alb-listener-{}", env.listener_port)),
            LISTENER,
        )
        .with_attribute("load_balancer_arn", Value::reference(LOAD_BALANCER, "arn"))
        .with_attribute("port", Value::Int(i64::from(env.listener_port)))
        .with_attribute("protocol", Value::string("HTTP"))
        // ingress is owned by the edge group rules, not by the listener
        .with_attribute("open", Value::Bool(false))
        .with_attribute("default_action", placeholder_action(env.listener_port)),
    );

    resources.push(
        Resource::new("iam_role", env.resource_name("asg-iam-role"), INSTANCE_ROLE)
            .with_attribute("role_name", Value::string(env.resource_name("asg-iam-role")))
            .with_attribute("assumed_by", Value::string(INSTANCE_PRINCIPAL))
            .with_attribute(
                "managed_policies",
                Value::List(vec![Value::string(INSTANCE_POLICY)]),
            ),
    );
    resources.push(
        Resource::new(
            "launch_template",
            env.resource_name("launch-template"),
            LAUNCH_TEMPLATE,
        )
        .with_attribute(
            "launch_template_name",
            Value::string(env.resource_name("launch-template")),
        )
        .with_attribute(
            "image_parameter",
            Value::string(env.fleet.ami_hardware.image_parameter()),
        )
        .with_attribute("instance_type", Value::string(&env.fleet.instance_type))
        .with_attribute("user_data", Value::string("linux"))
        .with_attribute("iam_role", Value::reference(INSTANCE_ROLE, "arn"))
        .with_attribute(
            "security_group_ids",
            Value::List(vec![Value::reference(
                GroupRole::Compute.binding(),
                "group_id",
            )]),
        ),
    );
    resources.push(
        Resource::new("auto_scaling_group", env.resource_name("asg"), SCALING_GROUP)
            .with_attribute(
                "auto_scaling_group_name",
                Value::string(env.resource_name("asg")),
            )
            .with_attribute("launch_template_id", Value::reference(LAUNCH_TEMPLATE, "id"))
            .with_attribute("subnets", Value::reference(PUBLIC_SUBNETS, "subnet_ids"))
            .with_attribute("min_size", Value::Int(i64::from(env.fleet.min_capacity)))
            .with_attribute("max_size", Value::Int(i64::from(env.fleet.max_capacity))),
    );
    resources.push(
        Resource::new(
            "capacity_provider",
            env.resource_name("capacity-provider"),
            CAPACITY_PROVIDER,
        )
        .with_attribute(
            "capacity_provider_name",
            Value::string(env.resource_name("capacity-provider")),
        )
        .with_attribute("auto_scaling_group_arn", Value::reference(SCALING_GROUP, "arn"))
        .with_attribute("managed_scaling", Value::Bool(true))
        .with_attribute("managed_termination_protection", Value::Bool(true))
        .with_attribute("managed_draining", Value::Bool(true)),
    );
    resources.push(
        Resource::new("cluster", env.resource_name("ecs-cluster"), CLUSTER)
            .with_attribute("cluster_name", Value::string(env.resource_name("ecs-cluster")))
            .with_attribute("vpc_id", Value::reference(NETWORK, "id")),
    );
    resources.push(
        Resource::new(
            "cluster_capacity_provider_binding",
            env.resource_name("ecs-cluster-capacity-providers"),
            CAPACITY_PROVIDER_BINDING,
        )
        .with_attribute("cluster", Value::reference(CLUSTER, "name"))
        .with_attribute(
            "capacity_providers",
            Value::List(vec![Value::reference(CAPACITY_PROVIDER, "name")]),
        ),
    );

    resources
        .into_iter()
        .map(|r| if r.read_only { r } else { tag(r, env) })
        .collect()
}

/// Order descriptors so every resource follows the ones it references
pub fn order(resources: Vec<Resource>) -> Result<Plan, CompileError> {
    let mut by_binding: HashMap<String, Resource> = HashMap::new();
    let mut graph = DependencyGraph::new();

    for resource in &resources {
        if graph.contains(&resource.binding) {
            return Err(CompileError::validation(
                None,
                format!("binding '{}' is declared twice", resource.binding),
            ));
        }
        graph.add_node(resource.binding.clone());
    }

    for resource in resources {
        for dep in resource.dependencies() {
            if !graph.contains(&dep) {
                return Err(CompileError::UnresolvedReference {
                    reference: dep,
                    context: format!("resource {}", resource.id),
                });
            }
            graph.add_edge(resource.binding.clone(), dep);
        }
        by_binding.insert(resource.binding.clone(), resource);
    }

    let sorted = graph
        .topological_order()
        .map_err(|cycle| CompileError::CyclicDependency { cycle })?;

    let mut plan = Plan::new();
    for binding in sorted {
        if let Some(resource) = by_binding.remove(&binding) {
            log::debug!("plan: {} as {}", resource.id, binding);
            plan.add(if resource.is_data_source() {
                Effect::Read(resource)
            } else {
                Effect::Create(resource)
            });
        }
    }
    Ok(plan)
}

fn security_group(env: &Environment, group: &SecurityGroup) -> Resource {
    Resource::new("security_group", group.id.as_str(), group.role.binding())
        .with_attribute("group_name", Value::string(group.id.as_str()))
        .with_attribute("description", Value::string(&group.description))
        .with_attribute("vpc_id", Value::reference(NETWORK, "id"))
        .with_attribute("role", Value::string(group.role.as_str()))
        .with_attribute("allow_all_outbound", Value::Bool(group.default_outbound))
        .with_attribute("environment", Value::string(env.name.as_str()))
}

fn rule_resource(policy: &CompiledPolicy, group: &SecurityGroup, rule: &Rule, n: usize) -> Resource {
    let (resource_type, suffix, peer_key) = match rule.direction {
        Direction::Inbound => (
            "security_group_ingress",
            "ingress",
            "source_security_group_id",
        ),
        Direction::Outbound => (
            "security_group_egress",
            "egress",
            "destination_security_group_id",
        ),
    };
    let binding = format!("{}_{}_{}", group.role.binding(), suffix, n);
    let (from_port, to_port) = rule.port.bounds();

    let resource = Resource::new(resource_type, format!("{}-{}-{}", group.id, suffix, n), binding)
        .with_attribute("group_id", Value::reference(group.role.binding(), "group_id"))
        .with_attribute("ip_protocol", Value::string("tcp"))
        .with_attribute("from_port", Value::Int(i64::from(from_port)))
        .with_attribute("to_port", Value::Int(i64::from(to_port)))
        .with_attribute("description", Value::string(&rule.description));

    match &rule.peer {
        Peer::Cidr(net) => resource.with_attribute("cidr_ip", Value::string(net.to_string())),
        Peer::Group(id) => {
            let peer_binding = policy
                .topology
                .by_id(id)
                .map(|g| g.role.binding())
                .unwrap_or(id.as_str());
            resource.with_attribute(peer_key, Value::reference(peer_binding, "group_id"))
        }
    }
}

/// The provisioning API rejects a listener without a default action. This
/// fixed response is that required default and carries no routing intent.
fn placeholder_action(port: u16) -> Value {
    let mut action = BTreeMap::new();
    action.insert("type".to_string(), Value::string("fixed-response"));
    action.insert("status_code".to_string(), Value::Int(200));
    action.insert(
        "message_body".to_string(),
        Value::string(format!("This is the ALB Default Action on port {}.", port)),
    );
    action.insert("placeholder".to_string(), Value::Bool(true));
    action.insert(
        "rationale".to_string(),
        Value::string("listener requires a non-empty default action"),
    );
    Value::Map(action)
}

fn tag(resource: Resource, env: &Environment) -> Resource {
    let mut tags = BTreeMap::new();
    tags.insert("Environment".to_string(), Value::string(env.name.as_str()));
    tags.insert("Stack".to_string(), Value::string(env.stack_name()));
    resource.with_attribute("tags", Value::Map(tags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::environment::EnvironmentName;
    use crate::policy::PolicyOptions;
    use crate::rule::{PeerRef, PortSpec, RuleAction, SymbolicRule};

    fn qa_plan() -> Plan {
        let env = Environment::builtin(EnvironmentName::Qa);
        emit(&compile(&env).unwrap()).unwrap()
    }

    fn bindings(plan: &Plan) -> Vec<String> {
        plan.effects()
            .iter()
            .filter_map(|e| e.resource().map(|r| r.binding.clone()))
            .collect()
    }

    #[test]
    fn network_lookup_first_and_binding_last() {
        for name in EnvironmentName::ALL {
            for options in [
                PolicyOptions::tiered(),
                PolicyOptions::open().with_legacy_open(true),
            ] {
                let env = Environment::builtin(name).with_policy(options);
                let plan = emit(&compile(&env).unwrap()).unwrap();
                let order = bindings(&plan);
                assert_eq!(order.first().map(String::as_str), Some(NETWORK));
                assert_eq!(
                    order.last().map(String::as_str),
                    Some(CAPACITY_PROVIDER_BINDING)
                );
            }
        }
    }

    #[test]
    fn plan_follows_topology_order() {
        let order = bindings(&qa_plan());
        assert_eq!(
            order,
            vec![
                "vpc",
                "public_subnets",
                "edge_sg",
                "compute_sg",
                "edge_sg_ingress_0",
                "edge_sg_egress_0",
                "compute_sg_ingress_0",
                "compute_sg_egress_0",
                "alb",
                "listener",
                "instance_role",
                "launch_template",
                "asg",
                "capacity_provider",
                "cluster",
                "cluster_capacity_providers",
            ]
        );
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        let plan = qa_plan();
        let order = bindings(&plan);
        for effect in plan.effects() {
            let resource = effect.resource().unwrap();
            let at = order.iter().position(|b| *b == resource.binding).unwrap();
            for dep in resource.dependencies() {
                let dep_at = order.iter().position(|b| *b == dep).unwrap();
                assert!(dep_at < at, "{} must precede {}", dep, resource.binding);
            }
        }
    }

    #[test]
    fn data_sources_are_reads() {
        let plan = qa_plan();
        assert!(matches!(plan.find(NETWORK), Some(Effect::Read(_))));
        assert!(matches!(plan.find(PUBLIC_SUBNETS), Some(Effect::Read(_))));
        assert!(matches!(plan.find(CLUSTER), Some(Effect::Create(_))));
        assert_eq!(plan.summary().read, 2);
    }

    #[test]
    fn compute_ingress_references_edge_group() {
        let plan = qa_plan();
        let rule = plan.find("compute_sg_ingress_0").unwrap().resource().unwrap();
        assert_eq!(
            rule.attributes.get("source_security_group_id"),
            Some(&Value::reference("edge_sg", "group_id"))
        );
        assert!(!rule.attributes.contains_key("cidr_ip"));
    }

    #[test]
    fn edge_egress_targets_network_cidr() {
        let plan = qa_plan();
        let rule = plan.find("edge_sg_egress_0").unwrap().resource().unwrap();
        assert_eq!(
            rule.attributes.get("cidr_ip"),
            Some(&Value::string("10.1.0.0/16"))
        );
        assert_eq!(rule.attributes.get("from_port"), Some(&Value::Int(0)));
        assert_eq!(rule.attributes.get("to_port"), Some(&Value::Int(65535)));
    }

    #[test]
    fn listener_default_action_is_placeholder() {
        let plan = qa_plan();
        let listener = plan.find(LISTENER).unwrap().resource().unwrap();
        let Some(Value::Map(action)) = listener.attributes.get("default_action") else {
            panic!("listener has no default action");
        };
        assert_eq!(action.get("placeholder"), Some(&Value::Bool(true)));
        assert_eq!(action.get("status_code"), Some(&Value::Int(200)));
        assert!(action.contains_key("rationale"));
        assert_eq!(
            action.get("message_body"),
            Some(&Value::string("This is the ALB Default Action on port 80."))
        );
    }

    #[test]
    fn deny_rules_emit_no_permissions() {
        let env = Environment::builtin(EnvironmentName::Qa).with_extra_rule(
            SymbolicRule::inbound("edge", PeerRef::AnyIpv4, PortSpec::Single(22), "no ssh")
                .with_action(RuleAction::Deny),
        );
        let plan = emit(&compile(&env).unwrap()).unwrap();

        let permissions: Vec<_> = plan
            .effects()
            .iter()
            .filter_map(|e| e.resource())
            .filter(|r| r.id.resource_type.starts_with("security_group_"))
            .collect();
        assert_eq!(permissions.len(), 4);
        for resource in permissions {
            assert!(!resource.attributes.contains_key("action"), "{}", resource.id);
            assert_ne!(resource.attributes.get("from_port"), Some(&Value::Int(22)));
        }
        assert!(plan.find("edge_sg_ingress_1").is_none());
    }

    #[test]
    fn created_resources_are_tagged() {
        let plan = qa_plan();
        for effect in plan.effects() {
            let resource = effect.resource().unwrap();
            let tagged = resource.attributes.contains_key("tags");
            assert_eq!(tagged, !resource.is_data_source(), "{}", resource.id);
        }
    }

    #[test]
    fn emitting_twice_is_byte_identical() {
        let env = Environment::builtin(EnvironmentName::Prod);
        let first = emit(&compile(&env).unwrap()).unwrap().to_json().unwrap();
        let second = emit(&compile(&env).unwrap()).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cycle_is_rejected() {
        let resources = vec![
            Resource::new("a", "a", "a").with_dependency("b"),
            Resource::new("b", "b", "b").with_attribute("x", Value::reference("a", "id")),
        ];
        assert!(matches!(
            order(resources),
            Err(CompileError::CyclicDependency { cycle }) if cycle == vec!["a", "b", "a"]
        ));
    }

    #[test]
    fn unknown_binding_is_unresolved() {
        let resources = vec![
            Resource::new("cluster", "c", "cluster").with_attribute("vpc_id", Value::reference("vpc", "id")),
        ];
        assert!(matches!(
            order(resources),
            Err(CompileError::UnresolvedReference { reference, .. }) if reference == "vpc"
        ));
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let resources = vec![
            Resource::new("a", "one", "a"),
            Resource::new("a", "two", "a"),
        ];
        assert!(matches!(
            order(resources),
            Err(CompileError::PolicyValidation { .. })
        ));
    }
}
