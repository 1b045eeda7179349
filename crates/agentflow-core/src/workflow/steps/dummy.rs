//! The `dummy` step: echoes its input. Useful for wiring and testing
//! workflows without any external dependency.

use std::collections::HashMap;

use serde_json::Value;

use agentflow_types::workflow::{Parameter, ParameterDataType};

use crate::workflow::step::{StepBinding, StepError, StepKind, StepSchema};

pub struct DummyStep {
    schema: StepSchema,
}

impl DummyStep {
    pub fn new() -> Self {
        Self {
            schema: StepSchema {
                name: "dummy".to_string(),
                description: "Takes an input and returns the same value as output. \
                              Useful for testing purposes."
                    .to_string(),
                inputs: vec![Parameter::new("input", ParameterDataType::String)],
                outputs: vec![Parameter::new("output", ParameterDataType::String)],
                required_integrations: vec![],
            },
        }
    }
}

impl Default for DummyStep {
    fn default() -> Self {
        Self::new()
    }
}

impl StepKind for DummyStep {
    fn schema(&self) -> &StepSchema {
        &self.schema
    }

    async fn execute(
        &self,
        binding: &StepBinding,
        _dry_run: bool,
    ) -> Result<HashMap<String, Value>, StepError> {
        let input = binding
            .resolved("input")
            .ok_or_else(|| StepError::MissingInput("input".to_string()))?;
        Ok(HashMap::from([("output".to_string(), input)]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bound(value: Value) -> StepBinding {
        let step = DummyStep::new();
        let mut binding = StepBinding::for_schema(step.schema());
        binding.input_mut("input").unwrap().set_value(value).unwrap();
        binding
    }

    #[tokio::test]
    async fn test_echoes_input() {
        let step = DummyStep::new();
        let outputs = step.execute(&bound(json!("hello")), false).await.unwrap();
        assert_eq!(outputs.get("output"), Some(&json!("hello")));
    }

    #[tokio::test]
    async fn test_missing_input_errors() {
        let step = DummyStep::new();
        let binding = StepBinding::for_schema(step.schema());
        let err = step.execute(&binding, false).await.unwrap_err();
        assert!(matches!(err, StepError::MissingInput(name) if name == "input"));
    }

    #[tokio::test]
    async fn test_dry_run_behaves_the_same() {
        let step = DummyStep::new();
        let outputs = step.execute(&bound(json!("dry")), true).await.unwrap();
        assert_eq!(outputs.get("output"), Some(&json!("dry")));
    }
}
