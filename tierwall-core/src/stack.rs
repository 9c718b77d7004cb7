//! Stack - The fail-fast compile, validate, emit pipeline for one environment

use crate::compiler::{CompiledPolicy, compile};
use crate::emitter::emit;
use crate::environment::{Environment, EnvironmentName};
use crate::error::CompileError;
use crate::plan::Plan;
use crate::validation::{ValidationReport, validate};

/// Everything produced for one environment
#[derive(Debug, Clone)]
pub struct StackPlan {
    pub policy: CompiledPolicy,
    pub report: ValidationReport,
    pub plan: Plan,
}

impl StackPlan {
    pub fn environment(&self) -> &Environment {
        &self.policy.environment
    }
}

/// Nothing is emitted unless compile and validation both succeed
pub fn build(env: &Environment) -> Result<StackPlan, CompileError> {
    env.check()
        .map_err(|e| CompileError::validation(None, e.to_string()))?;
    let policy = compile(env)?;
    let report = validate(&policy)?;
    let plan = emit(&policy)?;
    log::debug!(
        "{}: {} rules, {} effects, {} warnings",
        env.name,
        policy.rules.len(),
        plan.effects().len(),
        report.warnings.len()
    );
    Ok(StackPlan {
        policy,
        report,
        plan,
    })
}

/// Build each environment on its own; a failure is reported only for its environment
pub fn build_all<'a>(
    envs: impl IntoIterator<Item = &'a Environment>,
) -> Vec<(EnvironmentName, Result<StackPlan, CompileError>)> {
    envs.into_iter().map(|env| (env.name, build(env))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ComputeIngressSource, PolicyOptions};
    use crate::rule::Direction;
    use crate::topology::GroupRole;

    #[test]
    fn builtin_environments_build() {
        for name in EnvironmentName::ALL {
            let stack = build(&Environment::builtin(name)).unwrap();
            assert!(stack.report.is_clean());
            assert_eq!(stack.environment().name, name);
        }
    }

    #[test]
    fn every_group_has_egress_in_built_stacks() {
        for name in EnvironmentName::ALL {
            let stack = build(&Environment::builtin(name)).unwrap();
            for role in GroupRole::ALL {
                assert!(!stack.policy.rules_for(role, Direction::Outbound).is_empty());
            }
        }
    }

    #[test]
    fn one_failing_environment_does_not_affect_others() {
        let broken = Environment::builtin(EnvironmentName::Qa).with_policy(PolicyOptions {
            compute_ingress_source: ComputeIngressSource::Any,
            ..PolicyOptions::tiered()
        });
        let envs = [
            Environment::builtin(EnvironmentName::Dev),
            broken,
            Environment::builtin(EnvironmentName::Prod),
        ];

        let results = build_all(&envs);
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[1].1,
            Err(CompileError::PolicyValidation { .. })
        ));
        assert!(results[2].1.is_ok());
    }

    #[test]
    fn malformed_descriptor_is_rejected_before_compiling() {
        let mut env = Environment::builtin(EnvironmentName::Dev);
        env.listener_port = 0;
        assert!(matches!(
            build(&env),
            Err(CompileError::PolicyValidation {
                rule_index: None,
                ..
            })
        ));

        let mut env = Environment::builtin(EnvironmentName::Dev);
        env.fleet.min_capacity = 5;
        env.fleet.max_capacity = 2;
        let err = build(&env).unwrap_err();
        assert!(err.to_string().contains("min_capacity"));
    }

    #[test]
    fn rebuilding_yields_identical_plan_json() {
        let env = Environment::builtin(EnvironmentName::Qa);
        let a = build(&env).unwrap().plan.to_json().unwrap();
        let b = build(&env).unwrap().plan.to_json().unwrap();
        assert_eq!(a, b);
    }
}
