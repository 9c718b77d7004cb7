//! Errors raised while compiling, validating or emitting a plan
//!
//! Every variant is terminal for the environment being compiled; nothing is
//! retried and nothing is emitted once one of these is returned.

use crate::rule::Direction;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("Unresolved reference '{reference}' in {context}")]
    UnresolvedReference { reference: String, context: String },

    #[error(
        "Rules {first} and {second} for group '{group}' ({direction}) overlap with contradictory actions"
    )]
    ConflictingRule {
        group: String,
        direction: Direction,
        first: usize,
        second: usize,
    },

    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Policy validation failed{}: {reason}", rule_index.map(|i| format!(" at rule {}", i)).unwrap_or_default())]
    PolicyValidation {
        rule_index: Option<usize>,
        reason: String,
    },
}

impl CompileError {
    pub(crate) fn validation(rule_index: Option<usize>, reason: impl Into<String>) -> Self {
        CompileError::PolicyValidation {
            rule_index,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_mentions_rule_index() {
        let err = CompileError::validation(Some(2), "compute ingress must reference the edge group");
        assert_eq!(
            err.to_string(),
            "Policy validation failed at rule 2: compute ingress must reference the edge group"
        );

        let err = CompileError::validation(None, "edge group has no inbound rule");
        assert_eq!(
            err.to_string(),
            "Policy validation failed: edge group has no inbound rule"
        );
    }

    #[test]
    fn cycle_message_lists_path() {
        let err = CompileError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }
}
