//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.

use std::collections::{BTreeMap, HashMap};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Read succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Delete succeeded
    Deleted,
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
    /// Identifiers of already-existing resources, used by Delete effects
    identifiers: HashMap<ResourceId, String>,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
            identifiers: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_identifiers(mut self, identifiers: HashMap<ResourceId, String>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;
        // binding -> state reported for it during this apply
        let mut bound: HashMap<String, State> = HashMap::new();

        for effect in plan.effects() {
            let result = self.execute_effect(effect, &bound).await;

            match &result {
                Ok(outcome) => {
                    success_count += 1;
                    if let (Some(resource), EffectOutcome::Read { state } | EffectOutcome::Created { state }) =
                        (effect.resource(), outcome)
                    {
                        bound.insert(resource.binding.clone(), state.clone());
                    }
                }
                Err(e) => {
                    failure_count += 1;
                    log::error!("{}: {}", effect.resource_id(), e);
                    if !self.config.continue_on_error {
                        outcomes.push(result);
                        break;
                    }
                }
            }

            outcomes.push(result);
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bound: &HashMap<String, State>,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        match effect {
            Effect::Read(resource) => {
                log::info!("reading {}", resource.id);
                let state = self.provider.read(resource).await?;
                if !state.exists {
                    return Err(ProviderError::new("data source not found")
                        .for_resource(resource.id.clone()));
                }
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                log::info!("creating {}", resource.id);
                let resolved = resolve_references(resource, bound)?;
                let state = self.provider.create(&resolved).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Delete(id) => {
                log::info!("deleting {}", id);
                let identifier = self.identifiers.get(id).map(String::as_str).unwrap_or("");
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted)
            }
        }
    }
}

/// Replace every reference with the value reported for its binding
fn resolve_references(
    resource: &Resource,
    bound: &HashMap<String, State>,
) -> ProviderResult<Resource> {
    let mut resolved = resource.clone();
    for value in resolved.attributes.values_mut() {
        *value = resolve_value(value, bound)
            .map_err(|e| e.for_resource(resource.id.clone()))?;
    }
    Ok(resolved)
}

fn resolve_value(value: &Value, bound: &HashMap<String, State>) -> ProviderResult<Value> {
    match value {
        Value::ResourceRef(binding, attr) => bound
            .get(binding)
            .and_then(|state| state.attribute(attr))
            .ok_or_else(|| ProviderError::new(format!("unresolved reference {}.{}", binding, attr))),
        Value::List(items) => items
            .iter()
            .map(|v| resolve_value(v, bound))
            .collect::<ProviderResult<Vec<_>>>()
            .map(Value::List),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| resolve_value(v, bound).map(|v| (k.clone(), v)))
            .collect::<ProviderResult<BTreeMap<_, _>>>()
            .map(Value::Map),
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::BoxFuture;
    use std::sync::Mutex;

    /// Records created resources and assigns `<type>-<n>` identifiers
    #[derive(Default)]
    struct TestProvider {
        created: Mutex<Vec<Resource>>,
        fail_on: Option<&'static str>,
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn read(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let mut attrs = BTreeMap::new();
            attrs.insert("id".to_string(), Value::string("vpc-0001"));
            let state = State::existing(resource.id.clone(), attrs);
            Box::pin(async move { Ok(state) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let resource = resource.clone();
            Box::pin(async move {
                if Some(resource.binding.as_str()) == self.fail_on {
                    return Err(ProviderError::new("boom").for_resource(resource.id.clone()));
                }
                let mut created = self.created.lock().unwrap();
                let identifier = format!("{}-{}", resource.id.resource_type, created.len());
                let state = State::existing(resource.id.clone(), resource.attributes.clone())
                    .with_identifier(identifier);
                created.push(resource);
                Ok(state)
            })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn sample_plan() -> Plan {
        let mut plan = Plan::new();
        plan.add(Effect::Read(
            Resource::new("network_lookup", "vpc", "vpc").with_read_only(true),
        ));
        plan.add(Effect::Create(
            Resource::new("security_group", "edge", "edge_sg")
                .with_attribute("vpc_id", Value::reference("vpc", "id")),
        ));
        plan.add(Effect::Create(
            Resource::new("load_balancer", "alb", "alb").with_attribute(
                "security_groups",
                Value::List(vec![Value::reference("edge_sg", "group_id")]),
            ),
        ));
        plan
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(TestProvider::default());
        let plan = Plan::new();
        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn apply_resolves_references_from_earlier_effects() {
        let interpreter = Interpreter::new(TestProvider::default());
        let result = interpreter.apply(&sample_plan()).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 3);

        let created = interpreter.provider.created.lock().unwrap();
        assert_eq!(
            created[0].attributes.get("vpc_id"),
            Some(&Value::string("vpc-0001"))
        );
        assert_eq!(
            created[1].attributes.get("security_groups"),
            Some(&Value::List(vec![Value::string("security_group-0")]))
        );
    }

    #[tokio::test]
    async fn apply_stops_on_first_failure() {
        let provider = TestProvider {
            fail_on: Some("edge_sg"),
            ..Default::default()
        };
        let interpreter = Interpreter::new(provider);
        let result = interpreter.apply(&sample_plan()).await;

        assert!(!result.is_success());
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.failure_count, 1);
    }

    #[tokio::test]
    async fn continue_on_error_reports_dependent_failures() {
        let provider = TestProvider {
            fail_on: Some("edge_sg"),
            ..Default::default()
        };
        let config = InterpreterConfig {
            continue_on_error: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(provider).with_config(config);
        let result = interpreter.apply(&sample_plan()).await;

        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(result.failure_count, 2);
        let err = result.outcomes[2].as_ref().unwrap_err();
        assert!(err.message.contains("edge_sg.group_id"));
    }

    #[tokio::test]
    async fn unreported_attribute_reference_fails() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("security_group", "edge", "edge_sg")));
        plan.add(Effect::Create(
            Resource::new("load_balancer", "alb", "alb")
                .with_attribute("security_groups", Value::reference("edge_sg", "groupid")),
        ));

        let interpreter = Interpreter::new(TestProvider::default());
        let result = interpreter.apply(&plan).await;

        assert_eq!(result.failure_count, 1);
        let err = result.outcomes[1].as_ref().unwrap_err();
        assert!(err.message.contains("edge_sg.groupid"));
    }

    #[tokio::test]
    async fn dry_run_skips_effects() {
        let config = InterpreterConfig {
            dry_run: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(TestProvider::default()).with_config(config);
        let result = interpreter.apply(&sample_plan()).await;

        assert!(result.is_success());
        assert!(matches!(
            result.outcomes[0],
            Ok(EffectOutcome::Skipped { .. })
        ));
        assert!(interpreter.provider.created.lock().unwrap().is_empty());
    }
}
