//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//!
//! References between resources (`${binding.attribute}`) are resolved just
//! before each Effect runs, against the states produced so far.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{ErrorKind, Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State, Value};

/// Attributes visible to references, keyed by binding name
pub type Bindings = HashMap<String, HashMap<String, Value>>;

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Data source lookup succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Delete and re-create succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted,
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl EffectOutcome {
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Read { state }
            | EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            EffectOutcome::Deleted | EffectOutcome::Skipped { .. } => None,
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<(ResourceId, Result<EffectOutcome, ProviderError>)>,
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
    seed: Bindings,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
            seed: Bindings::new(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Pre-populate bindings for resources that are unchanged in this run
    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.seed = bindings;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut bindings = self.seed.clone();
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            let id = effect.resource_id().clone();
            log::debug!("executing {}", effect);
            let result = self.execute_effect(effect, &bindings).await;

            match &result {
                Ok(outcome) => {
                    success_count += 1;
                    if let Some(state) = outcome.state() {
                        bindings.insert(id.name.clone(), binding_attributes(state));
                    }
                }
                Err(e) => {
                    log::error!("{} failed: {}", effect, e);
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push((id, result));
                        break;
                    }
                }
            }

            outcomes.push((id, result));
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
        bindings: &Bindings,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        match effect {
            Effect::Read(resource) => {
                let resolved = resolve_resource(resource, bindings)?;
                let state = self.provider.read_data_source(&resolved).await?;
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let resolved = resolve_resource(resource, bindings)?;
                let state = self.provider.create(&resolved).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let resolved = resolve_resource(to, bindings)?;
                let identifier = require_identifier(id, from)?;
                let state = self
                    .provider
                    .update(id, identifier, from, &resolved)
                    .await?;
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to, .. } => {
                let resolved = resolve_resource(to, bindings)?;
                let identifier = require_identifier(id, from)?;
                self.provider.delete(id, identifier).await?;
                let state = self.provider.create(&resolved).await?;
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete { id, identifier } => {
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted)
            }
        }
    }
}

fn require_identifier<'a>(id: &ResourceId, from: &'a State) -> ProviderResult<&'a str> {
    from.identifier.as_deref().ok_or_else(|| {
        ProviderError::new("resource has no recorded identifier")
            .with_kind(ErrorKind::Validation)
            .for_resource(id.clone())
    })
}

/// Attributes a state exposes to references. `id` is the Aiven identifier.
pub fn binding_attributes(state: &State) -> HashMap<String, Value> {
    let mut attrs = state.attributes.clone();
    if let Some(identifier) = &state.identifier {
        attrs.insert("id".to_string(), Value::String(identifier.clone()));
    }
    attrs
}

/// Replace every reference in a resource with the value it points to
pub fn resolve_resource(resource: &Resource, bindings: &Bindings) -> ProviderResult<Resource> {
    let mut resolved = resource.clone();
    for (key, value) in &resource.attributes {
        let value = resolve_value(value, bindings)
            .map_err(|e| e.for_resource(resource.id.clone()))?;
        resolved.attributes.insert(key.clone(), value);
    }
    Ok(resolved)
}

fn resolve_value(value: &Value, bindings: &Bindings) -> ProviderResult<Value> {
    match value {
        Value::ResourceRef(binding, attr) => bindings
            .get(binding)
            .and_then(|attrs| attrs.get(attr))
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(format!("unresolved reference ${{{}.{}}}", binding, attr))
                    .with_kind(ErrorKind::Validation)
            }),
        Value::List(items) => items
            .iter()
            .map(|v| resolve_value(v, bindings))
            .collect::<ProviderResult<Vec<_>>>()
            .map(Value::List),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| resolve_value(v, bindings).map(|v| (k.clone(), v)))
            .collect::<ProviderResult<HashMap<_, _>>>()
            .map(Value::Map),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::BoxFuture;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestProvider {
        calls: Mutex<Vec<String>>,
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn resource_types(&self) -> Vec<Box<dyn crate::provider::ResourceType>> {
            vec![]
        }

        fn read(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let state = State::existing(resource.id.clone(), resource.attributes.clone())
                .with_identifier("acme");
            Box::pin(async move { Ok(state) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {}", resource.id));
            let identifier = match resource.get_str("project") {
                Some(project) => format!("{}/{}", project, resource.id.name),
                None => resource.id.name.clone(),
            };
            let state = State::existing(resource.id.clone(), resource.attributes.clone())
                .with_identifier(identifier);
            Box::pin(async move { Ok(state) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let state = State::existing(id.clone(), to.attributes.clone());
            Box::pin(async move { Ok(state) })
        }

        fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {} {}", id, identifier));
            Box::pin(async { Ok(()) })
        }
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
    async fn apply_create_effect() {
        let interpreter = Interpreter::new(TestProvider::default());
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("project", "acme")));

        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 1);
    }

    #[tokio::test]
    async fn references_resolve_against_earlier_effects() {
        let interpreter = Interpreter::new(TestProvider::default());
        let mut plan = Plan::new();
        plan.add(Effect::Read(
            Resource::new("project", "proj")
                .with_attribute("project", Value::String("acme".to_string()))
                .with_read_only(true),
        ));
        plan.add(Effect::Create(Resource::new("pg", "db").with_attribute(
            "project",
            Value::ResourceRef("proj".to_string(), "project".to_string()),
        )));

        let result = interpreter.apply(&plan).await;
        assert!(result.is_success());

        let (id, outcome) = &result.outcomes[1];
        assert_eq!(id.to_string(), "pg.db");
        let state = outcome.as_ref().unwrap().state().unwrap();
        assert_eq!(state.identifier.as_deref(), Some("acme/db"));
    }

    #[tokio::test]
    async fn unresolved_reference_stops_apply() {
        let interpreter = Interpreter::new(TestProvider::default());
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("pg", "db").with_attribute(
            "project",
            Value::ResourceRef("missing".to_string(), "project".to_string()),
        )));
        plan.add(Effect::Create(Resource::new("project", "other")));

        let result = interpreter.apply(&plan).await;
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.outcomes.len(), 1);
        let err = result.outcomes[0].1.as_ref().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.to_string().contains("${missing.project}"));
    }

    #[tokio::test]
    async fn replace_deletes_before_create() {
        let interpreter = Interpreter::new(TestProvider::default());
        let id = ResourceId::new("project_vpc", "vpc");
        let from = State::existing(id.clone(), HashMap::new()).with_identifier("acme/1234");
        let mut plan = Plan::new();
        plan.add(Effect::Replace {
            id: id.clone(),
            from,
            to: Resource::new("project_vpc", "vpc"),
            changed_attributes: vec!["cloud_name".to_string()],
        });

        let result = interpreter.apply(&plan).await;
        assert!(result.is_success());
        let calls = interpreter.provider().calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "delete project_vpc.vpc acme/1234".to_string(),
                "create project_vpc.vpc".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_skips_effects() {
        let config = InterpreterConfig {
            dry_run: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(TestProvider::default()).with_config(config);
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("project", "acme")));

        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert!(matches!(
            result.outcomes[0].1,
            Ok(EffectOutcome::Skipped { .. })
        ));
    }
}
