//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use serde::Serialize;

use crate::effect::Effect;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of mutating Effects
    pub fn mutation_count(&self) -> usize {
        self.effects.iter().filter(|e| e.is_mutating()).count()
    }

    /// Find the effect for a binding name
    pub fn find(&self, binding: &str) -> Option<&Effect> {
        self.effects
            .iter()
            .find(|e| e.resource().is_some_and(|r| r.binding == binding))
    }

    /// Delete every created resource, dependents first. Data sources are left alone.
    pub fn teardown(&self) -> Plan {
        let effects = self
            .effects
            .iter()
            .rev()
            .filter_map(|e| match e {
                Effect::Create(r) => Some(Effect::Delete(r.id.clone())),
                Effect::Read(_) | Effect::Delete(_) => None,
            })
            .collect();
        Plan { effects }
    }

    /// Ordered JSON handed to the provisioning collaborator
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Read(_) => summary.read += 1,
                Effect::Create(_) => summary.create += 1,
                Effect::Delete(_) => summary.delete += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub read: usize,
    pub create: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to read, {} to create, {} to delete",
            self.read, self.create, self.delete
        )
    }
}
