//! Compiler - Bind a symbolic rule table to an environment's topology
//!
//! Compiling resolves every group and peer reference to a declared group or a
//! literal network range. It is a pure function: the same descriptor always
//! compiles to the same rules, in table order.

use crate::environment::Environment;
use crate::error::CompileError;
use crate::policy::PolicyOptions;
use crate::rule::{Direction, Peer, PeerRef, Rule, RuleTable, any_ipv4};
use crate::topology::{GroupRole, SecurityGroup, Topology};

/// Bound rules plus the groups hosting them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPolicy {
    pub environment: Environment,
    pub topology: Topology,
    /// Index-aligned with the rule table the policy was compiled from
    pub rules: Vec<Rule>,
}

impl CompiledPolicy {
    pub fn options(&self) -> PolicyOptions {
        self.environment.policy
    }

    pub fn group(&self, role: GroupRole) -> Option<&SecurityGroup> {
        self.topology.group(role)
    }

    /// Rules attached to the group with `role`, with their index
    pub fn rules_for(&self, role: GroupRole, direction: Direction) -> Vec<(usize, &Rule)> {
        let Some(group) = self.group(role) else {
            return Vec::new();
        };
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.group == group.id && r.direction == direction)
            .collect()
    }
}

/// Compile the environment's own rule table
pub fn compile(env: &Environment) -> Result<CompiledPolicy, CompileError> {
    compile_table(env, &RuleTable::for_environment(env))
}

pub fn compile_table(env: &Environment, table: &RuleTable) -> Result<CompiledPolicy, CompileError> {
    let topology = Topology::for_environment(env);
    let mut rules: Vec<Rule> = Vec::with_capacity(table.len());

    for (index, symbolic) in table.rules().iter().enumerate() {
        let context = format!("rule {}", index);

        let group = topology
            .resolve(&symbolic.group)
            .ok_or_else(|| CompileError::UnresolvedReference {
                reference: symbolic.group.clone(),
                context: context.clone(),
            })?;

        let peer = match &symbolic.peer {
            PeerRef::Cidr(net) => Peer::Cidr(*net),
            PeerRef::AnyIpv4 => Peer::Cidr(any_ipv4()),
            PeerRef::NetworkCidr => Peer::Cidr(env.network_cidr),
            PeerRef::Group(name) => {
                let peer_group =
                    topology
                        .resolve(name)
                        .ok_or_else(|| CompileError::UnresolvedReference {
                            reference: name.clone(),
                            context: context.clone(),
                        })?;
                Peer::Group(peer_group.id.clone())
            }
        };

        if !symbolic.port.is_well_formed() {
            return Err(CompileError::validation(
                Some(index),
                format!("port range {} is inverted", symbolic.port),
            ));
        }

        let rule = Rule {
            group: group.id.clone(),
            direction: symbolic.direction,
            peer,
            port: symbolic.port,
            action: symbolic.action,
            description: symbolic.description.clone(),
        };

        if let Some(first) = rules.iter().position(|other| contradicts(other, &rule)) {
            return Err(CompileError::ConflictingRule {
                group: rule.group.to_string(),
                direction: rule.direction,
                first,
                second: index,
            });
        }

        log::debug!(
            "{}: bound rule {} {} {} port {} -> {}",
            env.name,
            index,
            rule.action,
            rule.direction,
            rule.port,
            rule.peer
        );
        rules.push(rule);
    }

    Ok(CompiledPolicy {
        environment: env.clone(),
        topology,
        rules,
    })
}

/// Same group and direction, overlapping peers and ports, different actions
fn contradicts(a: &Rule, b: &Rule) -> bool {
    a.group == b.group
        && a.direction == b.direction
        && a.peer.overlaps(&b.peer)
        && a.port.overlaps(&b.port)
        && a.action != b.action
}
