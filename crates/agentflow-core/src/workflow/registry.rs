//! Registry of available step types.
//!
//! An explicit alias-to-implementation table. Workflows name step types
//! by alias in their `type:` field; the registry resolves the alias and
//! hands out fresh [`StepInstance`]s.

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::BoxLlmProvider;

use super::step::{BoxStepKind, StepInstance, StepKind, StepSchema};
use super::steps::dummy::DummyStep;
use super::steps::llm::LlmStep;

pub struct StepRegistry {
    kinds: HashMap<String, Arc<BoxStepKind>>,
}

impl StepRegistry {
    /// An empty registry. Most callers want [`StepRegistry::builtin`].
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// The built-in step set: `dummy` and `llm`.
    pub fn builtin(provider: Arc<BoxLlmProvider>) -> Self {
        let mut registry = Self::new();
        registry.register(DummyStep::new());
        registry.register(LlmStep::new(provider));
        registry
    }

    /// Register a step type under its schema alias. A later
    /// registration with the same alias replaces the earlier one.
    pub fn register<T: StepKind + 'static>(&mut self, kind: T) {
        let alias = kind.schema().name.clone();
        tracing::debug!(%alias, "registering step type");
        self.kinds.insert(alias, Arc::new(BoxStepKind::new(kind)));
    }

    pub fn get(&self, alias: &str) -> Option<Arc<BoxStepKind>> {
        self.kinds.get(alias).map(Arc::clone)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.kinds.contains_key(alias)
    }

    /// Create a fresh instance of a step type, or `None` for an
    /// unknown alias.
    pub fn instantiate(&self, alias: &str, instance_name: &str) -> Option<StepInstance> {
        self.get(alias)
            .map(|kind| StepInstance::new(instance_name, kind))
    }

    /// All registered schemas, sorted by alias.
    pub fn schemas(&self) -> Vec<&StepSchema> {
        let mut schemas: Vec<&StepSchema> = self.kinds.values().map(|k| k.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use agentflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

    use crate::llm::LlmProvider;

    struct NullProvider;

    impl LlmProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::Provider {
                message: "null provider".to_string(),
            })
        }
    }

    fn builtin_registry() -> StepRegistry {
        StepRegistry::builtin(Arc::new(BoxLlmProvider::new(NullProvider)))
    }

    #[test]
    fn test_builtin_registry_has_dummy_and_llm() {
        let registry = builtin_registry();
        assert!(registry.contains("dummy"));
        assert!(registry.contains("llm"));
        assert!(!registry.contains("no_such_step"));
    }

    #[test]
    fn test_instantiate_unknown_alias_is_none() {
        let registry = builtin_registry();
        assert!(registry.instantiate("no_such_step", "s1").is_none());
    }

    #[test]
    fn test_instantiate_yields_fresh_instances() {
        let registry = builtin_registry();
        let a = registry.instantiate("dummy", "a").unwrap();
        let b = registry.instantiate("dummy", "b").unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(b.name, "b");
        assert_eq!(a.step_type(), "dummy");
    }

    #[test]
    fn test_schemas_sorted_by_alias() {
        let registry = builtin_registry();
        let names: Vec<&str> = registry.schemas().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["dummy", "llm"]);
    }
}
