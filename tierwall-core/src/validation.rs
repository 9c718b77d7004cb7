//! Validation - Accept or reject a compiled policy before anything is emitted

use std::fmt;

use crate::compiler::CompiledPolicy;
use crate::error::CompileError;
use crate::policy::InboundPort;
use crate::rule::{Direction, GroupId};
use crate::topology::GroupRole;

/// Non-fatal finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyWarning {
    pub rule_index: usize,
    pub group: GroupId,
    pub message: String,
}

impl fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule {} ({}): {}", self.rule_index, self.group, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub warnings: Vec<PolicyWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Check a compiled policy against the baseline invariants
pub fn validate(policy: &CompiledPolicy) -> Result<ValidationReport, CompileError> {
    let env = &policy.environment.name;
    let options = policy.options();

    for group in policy.topology.groups() {
        if group.default_outbound {
            return Err(CompileError::validation(
                None,
                format!("group '{}' permits unrestricted egress by default", group.id),
            ));
        }
        let has_egress = policy
            .rules
            .iter()
            .any(|r| r.group == group.id && r.direction == Direction::Outbound && r.is_allow());
        if !has_egress {
            return Err(CompileError::validation(
                None,
                format!(
                    "group '{}' has no outbound rule and would have no connectivity",
                    group.id
                ),
            ));
        }
    }

    let edge_inbound = policy.rules_for(GroupRole::Edge, Direction::Inbound);
    if !edge_inbound.iter().any(|(_, r)| r.is_allow()) {
        return Err(CompileError::validation(
            None,
            "edge group has no inbound rule",
        ));
    }

    if options.inbound_port == InboundPort::SinglePort {
        for (index, rule) in policy.rules_for(GroupRole::Compute, Direction::Inbound) {
            if rule.is_allow() && rule.peer.is_cidr() {
                return Err(CompileError::validation(
                    Some(index),
                    format!(
                        "compute ingress from {} bypasses the edge tier; reference the edge group instead",
                        rule.peer
                    ),
                ));
            }
        }
    }

    let mut report = ValidationReport::default();
    for (index, rule) in policy.rules.iter().enumerate() {
        let exposed = rule.direction == Direction::Inbound
            && rule.is_allow()
            && rule.peer.is_anywhere()
            && rule.port.is_all();
        if !exposed {
            continue;
        }
        if !options.allow_legacy_open {
            return Err(CompileError::validation(
                Some(index),
                format!(
                    "group '{}' accepts all ports from anywhere; set allow_legacy_open to keep the open model",
                    rule.group
                ),
            ));
        }
        let warning = PolicyWarning {
            rule_index: index,
            group: rule.group.clone(),
            message: "full inbound exposure on all ports from 0.0.0.0/0".to_string(),
        };
        log::warn!("{}: {}", env, warning);
        report.warnings.push(warning);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, compile_table};
    use crate::environment::{Environment, EnvironmentName};
    use crate::policy::{ComputeIngressSource, PolicyOptions};
    use crate::rule::{PeerRef, PortSpec, RuleTable, SymbolicRule};
    use crate::topology::Topology;

    #[test]
    fn tiered_policy_is_clean() {
        for name in EnvironmentName::ALL {
            let policy = compile(&Environment::builtin(name)).unwrap();
            let report = validate(&policy).unwrap();
            assert!(report.is_clean(), "{}: {:?}", name, report);
        }
    }

    #[test]
    fn open_policy_warns_when_opted_in() {
        let env = Environment::builtin(EnvironmentName::Prod)
            .with_policy(PolicyOptions::open().with_legacy_open(true));
        let report = validate(&compile(&env).unwrap()).unwrap();

        let indices: Vec<_> = report.warnings.iter().map(|w| w.rule_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(report.warnings[0].message.contains("all ports"));
    }

    #[test]
    fn open_policy_without_opt_in_is_rejected() {
        let env = Environment::builtin(EnvironmentName::Prod).with_policy(PolicyOptions::open());
        let err = validate(&compile(&env).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::PolicyValidation {
                rule_index: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn single_port_with_cidr_compute_ingress_is_rejected() {
        let env = Environment::builtin(EnvironmentName::Qa).with_policy(PolicyOptions {
            compute_ingress_source: ComputeIngressSource::Any,
            allow_legacy_open: true,
            ..PolicyOptions::tiered()
        });
        let err = validate(&compile(&env).unwrap()).unwrap_err();
        match err {
            CompileError::PolicyValidation { rule_index, reason } => {
                assert_eq!(rule_index, Some(2));
                assert!(reason.contains("bypasses the edge tier"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn narrow_cidr_compute_ingress_is_rejected_too() {
        let env = Environment::builtin(EnvironmentName::Qa).with_extra_rule(SymbolicRule::inbound(
            "compute",
            PeerRef::NetworkCidr,
            PortSpec::Single(22),
            "ssh from the network",
        ));
        assert!(matches!(
            validate(&compile(&env).unwrap()),
            Err(CompileError::PolicyValidation {
                rule_index: Some(4),
                ..
            })
        ));
    }

    #[test]
    fn stranded_group_is_rejected() {
        let env = Environment::builtin(EnvironmentName::Qa);
        let table: RuleTable = RuleTable::for_environment(&env)
            .rules()
            .iter()
            .filter(|r| !(r.group == "compute" && r.direction == Direction::Outbound))
            .cloned()
            .collect();
        let policy = compile_table(&env, &table).unwrap();

        let err = validate(&policy).unwrap_err();
        assert!(err.to_string().contains("no outbound rule"));
    }

    #[test]
    fn default_outbound_group_is_rejected() {
        let env = Environment::builtin(EnvironmentName::Dev);
        let mut policy = compile(&env).unwrap();
        let mut groups = policy.topology.groups().to_vec();
        groups[1].default_outbound = true;
        policy.topology = Topology::from_groups(groups);

        let err = validate(&policy).unwrap_err();
        assert!(err.to_string().contains("unrestricted egress"));
    }

    #[test]
    fn edge_without_inbound_is_rejected() {
        let env = Environment::builtin(EnvironmentName::Dev);
        let table: RuleTable = RuleTable::for_environment(&env)
            .rules()
            .iter()
            .filter(|r| !(r.group == "edge" && r.direction == Direction::Inbound))
            .cloned()
            .collect();
        let policy = compile_table(&env, &table).unwrap();

        let err = validate(&policy).unwrap_err();
        assert_eq!(
            err,
            CompileError::validation(None, "edge group has no inbound rule")
        );
    }

    #[test]
    fn validation_does_not_mutate_policy() {
        let env = Environment::builtin(EnvironmentName::Prod)
            .with_policy(PolicyOptions::open().with_legacy_open(true));
        let policy = compile(&env).unwrap();
        let before = policy.clone();
        let _ = validate(&policy);
        assert_eq!(policy, before);
    }
}
