//! Step capability contract and per-instance execution lifecycle.
//!
//! A step type is described by a [`StepSchema`] (its alias, description,
//! and declared input/output parameters) and implemented behind the
//! [`StepKind`] trait. `StepKind` uses RPITIT for `execute`; the
//! object-safe [`BoxStepKind`] wrapper (same blanket-impl pattern as
//! `BoxLlmProvider`) is what the registry stores.
//!
//! A [`StepInstance`] is one named occurrence of a step type inside a
//! workflow, with its own fresh [`StepBinding`]. Instances are created
//! per run, so values bound during one run (or during the dry-run
//! simulation) never leak into the next.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use agentflow_types::llm::LlmError;
use agentflow_types::workflow::{
    BoundParameter, Parameter, ParameterDataType, WorkflowStepResult, WorkflowStepStatus,
};

use super::context::RunContext;
use super::resolve::ReferenceError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures raised from inside a step's binding or execution.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("missing required input parameter `{0}`")]
    MissingInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Failed(String),
}

/// Any error that aborts a step run.
///
/// Reference errors are kept apart from process errors so a dry run can
/// report a broken `@{...}` reference as such instead of as a generic
/// step failure.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Process(#[from] StepError),
}

// ---------------------------------------------------------------------------
// Schema and trait
// ---------------------------------------------------------------------------

/// Static description of a step type: the alias workflows use in their
/// `type:` field, the declared parameter slots, and the external
/// integrations the step needs at run time.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepSchema {
    pub name: String,
    pub description: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    pub required_integrations: Vec<String>,
}

/// A step type implementation.
///
/// `execute` receives the instance's binding (inputs resolved and
/// coerced, outputs planned) and returns the produced output values
/// keyed by output name. In dry-run mode it must not touch any
/// external system.
pub trait StepKind: Send + Sync {
    fn schema(&self) -> &StepSchema;

    /// Output declarations for one bound instance. The default keeps
    /// the static schema outputs; step types with an `output_names`
    /// input override this to swap in the requested set.
    fn plan_outputs(&self, binding: &StepBinding) -> Vec<Parameter> {
        let _ = binding;
        self.schema().outputs.clone()
    }

    fn execute(
        &self,
        binding: &StepBinding,
        dry_run: bool,
    ) -> impl Future<Output = Result<HashMap<String, Value>, StepError>> + Send;
}

// ---------------------------------------------------------------------------
// Object-safe wrapper
// ---------------------------------------------------------------------------

/// Object-safe version of [`StepKind`] with a boxed `execute` future.
pub trait StepKindDyn: Send + Sync {
    fn schema(&self) -> &StepSchema;

    fn plan_outputs(&self, binding: &StepBinding) -> Vec<Parameter>;

    fn execute_boxed<'a>(
        &'a self,
        binding: &'a StepBinding,
        dry_run: bool,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, Value>, StepError>> + Send + 'a>>;
}

/// Blanket implementation: any `StepKind` automatically implements `StepKindDyn`.
impl<T: StepKind> StepKindDyn for T {
    fn schema(&self) -> &StepSchema {
        StepKind::schema(self)
    }

    fn plan_outputs(&self, binding: &StepBinding) -> Vec<Parameter> {
        StepKind::plan_outputs(self, binding)
    }

    fn execute_boxed<'a>(
        &'a self,
        binding: &'a StepBinding,
        dry_run: bool,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, Value>, StepError>> + Send + 'a>> {
        Box::pin(self.execute(binding, dry_run))
    }
}

/// Type-erased step type, as stored in the registry.
pub struct BoxStepKind {
    inner: Box<dyn StepKindDyn + Send + Sync>,
}

impl BoxStepKind {
    pub fn new<T: StepKind + 'static>(kind: T) -> Self {
        Self {
            inner: Box::new(kind),
        }
    }

    pub fn schema(&self) -> &StepSchema {
        self.inner.schema()
    }

    pub fn plan_outputs(&self, binding: &StepBinding) -> Vec<Parameter> {
        self.inner.plan_outputs(binding)
    }

    pub async fn execute(
        &self,
        binding: &StepBinding,
        dry_run: bool,
    ) -> Result<HashMap<String, Value>, StepError> {
        self.inner.execute_boxed(binding, dry_run).await
    }
}

// ---------------------------------------------------------------------------
// StepBinding
// ---------------------------------------------------------------------------

/// The per-instance parameter bindings of one step occurrence.
#[derive(Debug, Clone, Default)]
pub struct StepBinding {
    pub inputs: Vec<BoundParameter>,
    pub outputs: Vec<BoundParameter>,
}

impl StepBinding {
    /// Fresh, unbound inputs from a schema. Outputs are planned later,
    /// once the bound inputs are known (dynamic output names).
    pub fn for_schema(schema: &StepSchema) -> Self {
        Self {
            inputs: schema.inputs.iter().map(Parameter::bind).collect(),
            outputs: Vec::new(),
        }
    }

    pub fn input(&self, name: &str) -> Option<&BoundParameter> {
        self.inputs.iter().find(|b| b.spec.name == name)
    }

    pub fn input_mut(&mut self, name: &str) -> Option<&mut BoundParameter> {
        self.inputs.iter_mut().find(|b| b.spec.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&BoundParameter> {
        self.outputs.iter().find(|b| b.spec.name == name)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut BoundParameter> {
        self.outputs.iter_mut().find(|b| b.spec.name == name)
    }

    /// Coerced value of an input (bound value or declared default).
    pub fn resolved(&self, name: &str) -> Option<Value> {
        self.input(name).and_then(BoundParameter::resolved_value)
    }

    /// Coerced value of an input, rendered as a string.
    pub fn resolved_string(&self, name: &str) -> Option<String> {
        self.resolved(name)
            .map(|v| agentflow_types::workflow::display_value(&v))
    }

    /// Declared output names, in declaration order.
    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|b| b.spec.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// StepInstance
// ---------------------------------------------------------------------------

/// One named occurrence of a step type, with its own binding.
pub struct StepInstance {
    pub name: String,
    kind: Arc<BoxStepKind>,
    pub binding: StepBinding,
}

impl StepInstance {
    pub fn new(name: impl Into<String>, kind: Arc<BoxStepKind>) -> Self {
        let binding = StepBinding::for_schema(kind.schema());
        Self {
            name: name.into(),
            kind,
            binding,
        }
    }

    /// The step type alias (e.g. "dummy", "llm").
    pub fn step_type(&self) -> &str {
        &self.kind.schema().name
    }

    /// Bind the workflow-declared input values. A required input with
    /// no value is an error; optional inputs fall back to their
    /// declared default.
    pub fn bind_inputs(&mut self, provided: &HashMap<String, Value>) -> Result<(), StepError> {
        for bound in &mut self.binding.inputs {
            if let Some(value) = provided.get(&bound.spec.name) {
                bound
                    .set_value(value.clone())
                    .map_err(|e| StepError::InvalidInput(e.to_string()))?;
            } else if !bound.spec.optional {
                return Err(StepError::MissingInput(bound.spec.name.clone()));
            } else if bound.spec.default.is_some() {
                bound.value = bound.spec.default.clone();
            }
        }
        Ok(())
    }

    /// Run the step against the shared context.
    ///
    /// In live mode any failure is isolated: the error is captured in a
    /// FAILURE result with a synthetic `error` output, and `Ok` is
    /// returned so the workflow can continue. In dry-run mode failures
    /// propagate, so the workflow constructor can reject the
    /// definition.
    pub async fn run(
        &mut self,
        context: &mut RunContext,
        dry_run: bool,
    ) -> Result<WorkflowStepResult, StepFailure> {
        tracing::debug!(step = %self.name, step_type = %self.step_type(), dry_run, "running step");
        let started_at = Utc::now();
        match self.run_inner(context, dry_run, started_at).await {
            Ok(result) => Ok(result),
            Err(failure) if dry_run => Err(failure),
            Err(failure) => {
                tracing::error!(step = %self.name, error = %failure, "step failed");
                Ok(self.failure_result(started_at, &failure))
            }
        }
    }

    async fn run_inner(
        &mut self,
        context: &mut RunContext,
        dry_run: bool,
        started_at: DateTime<Utc>,
    ) -> Result<WorkflowStepResult, StepFailure> {
        // Plan instance outputs before resolution: dynamic output names
        // are literals, never references.
        self.binding.outputs = self
            .kind
            .plan_outputs(&self.binding)
            .iter()
            .map(Parameter::bind)
            .collect();

        // No name may appear in both inputs and outputs: the context
        // key `<step>.<name>` would be written twice.
        for output in &self.binding.outputs {
            if self.binding.input(&output.spec.name).is_some() {
                return Err(StepError::InvalidInput(format!(
                    "output `{}` collides with an input of the same name",
                    output.spec.name
                ))
                .into());
            }
        }

        // Resolve references in bound string inputs, then publish each
        // bound input to the context so later steps can reference it.
        for idx in 0..self.binding.inputs.len() {
            if let Some(Value::String(template)) = self.binding.inputs[idx].value.clone() {
                let resolved = context.resolve(&template, &self.name)?;
                self.binding.inputs[idx]
                    .set_value(Value::String(resolved))
                    .map_err(|e| StepError::InvalidInput(e.to_string()))?;
            }
            let bound = &self.binding.inputs[idx];
            if let Some(value) = &bound.value {
                context.set(&self.name, &bound.spec.name, value.clone());
            }
        }

        let produced = self
            .kind
            .execute(&self.binding, dry_run)
            .await
            .map_err(StepFailure::Process)?;

        // Bind declared outputs and publish them; undeclared keys are
        // dropped with a warning.
        let mut outputs = Vec::new();
        for idx in 0..self.binding.outputs.len() {
            let name = self.binding.outputs[idx].spec.name.clone();
            if let Some(value) = produced.get(&name) {
                self.binding.outputs[idx].value = Some(value.clone());
                context.set(&self.name, &name, value.clone());
                outputs.push(self.binding.outputs[idx].clone());
            }
        }
        for key in produced.keys() {
            if self.binding.output(key).is_none() {
                tracing::warn!(step = %self.name, output = %key, "undeclared output parameter dropped");
            }
        }

        Ok(WorkflowStepResult {
            step_name: self.name.clone(),
            step_type: self.step_type().to_string(),
            status: WorkflowStepStatus::Success,
            status_reason: None,
            inputs: self.bound_inputs(),
            outputs,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Failure record mirroring the success shape, with the error text
    /// as a synthetic `error` output.
    pub fn failure_result(
        &self,
        started_at: DateTime<Utc>,
        failure: &StepFailure,
    ) -> WorkflowStepResult {
        let mut error_param = Parameter::new("error", ParameterDataType::String).bind();
        error_param.value = Some(Value::String(failure.to_string()));
        WorkflowStepResult {
            step_name: self.name.clone(),
            step_type: self.step_type().to_string(),
            status: WorkflowStepStatus::Failure,
            status_reason: Some(failure.to_string()),
            inputs: self.bound_inputs(),
            outputs: vec![error_param],
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn bound_inputs(&self) -> Vec<BoundParameter> {
        self.binding
            .inputs
            .iter()
            .filter(|b| b.value.is_some())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Echoes its `message` input as `echo`, or fails on demand.
    struct EchoStep {
        schema: StepSchema,
    }

    impl EchoStep {
        fn new() -> Self {
            Self {
                schema: StepSchema {
                    name: "echo".to_string(),
                    description: "echo for tests".to_string(),
                    inputs: vec![
                        Parameter::new("message", ParameterDataType::String),
                        Parameter::new("fail", ParameterDataType::Boolean)
                            .optional()
                            .with_default(false),
                    ],
                    outputs: vec![Parameter::new("echo", ParameterDataType::String)],
                    required_integrations: vec![],
                },
            }
        }
    }

    impl StepKind for EchoStep {
        fn schema(&self) -> &StepSchema {
            &self.schema
        }

        async fn execute(
            &self,
            binding: &StepBinding,
            _dry_run: bool,
        ) -> Result<HashMap<String, Value>, StepError> {
            if binding.resolved("fail") == Some(json!(true)) {
                return Err(StepError::Failed("requested failure".to_string()));
            }
            let message = binding
                .resolved("message")
                .ok_or_else(|| StepError::MissingInput("message".to_string()))?;
            Ok(HashMap::from([
                ("echo".to_string(), message),
                ("extra".to_string(), json!("dropped")),
            ]))
        }
    }

    fn echo_instance(name: &str) -> StepInstance {
        StepInstance::new(name, Arc::new(BoxStepKind::new(EchoStep::new())))
    }

    #[test]
    fn test_bind_inputs_missing_required() {
        let mut instance = echo_instance("s1");
        let err = instance.bind_inputs(&HashMap::new()).unwrap_err();
        assert!(matches!(err, StepError::MissingInput(name) if name == "message"));
    }

    #[test]
    fn test_bind_inputs_defaults_optional() {
        let mut instance = echo_instance("s1");
        instance
            .bind_inputs(&HashMap::from([("message".to_string(), json!("hi"))]))
            .unwrap();
        assert_eq!(instance.binding.input("fail").unwrap().value, Some(json!(false)));
    }

    #[tokio::test]
    async fn test_run_resolves_and_publishes() {
        let mut context = RunContext::new();
        context.set("input", "name", json!("world"));

        let mut instance = echo_instance("s1");
        instance
            .bind_inputs(&HashMap::from([(
                "message".to_string(),
                json!("hello @{input.name}"),
            )]))
            .unwrap();

        let result = instance.run(&mut context, false).await.unwrap();
        assert_eq!(result.status, WorkflowStepStatus::Success);
        assert_eq!(result.step_type, "echo");
        // resolved input published
        assert_eq!(context.get("s1.message"), Some(&json!("hello world")));
        // output bound and published
        assert_eq!(context.get("s1.echo"), Some(&json!("hello world")));
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs[0].value, Some(json!("hello world")));
        // undeclared `extra` output dropped
        assert_eq!(context.get("s1.extra"), None);
    }

    #[tokio::test]
    async fn test_unresolved_reference_propagates_in_dry_run() {
        let mut context = RunContext::new();
        let mut instance = echo_instance("s1");
        instance
            .bind_inputs(&HashMap::from([(
                "message".to_string(),
                json!("@{nowhere.value}"),
            )]))
            .unwrap();

        let err = instance.run(&mut context, true).await.unwrap_err();
        assert!(matches!(err, StepFailure::Reference(_)));
    }

    #[tokio::test]
    async fn test_live_failure_is_isolated_into_result() {
        let mut context = RunContext::new();
        let mut instance = echo_instance("s1");
        instance
            .bind_inputs(&HashMap::from([
                ("message".to_string(), json!("hi")),
                ("fail".to_string(), json!(true)),
            ]))
            .unwrap();

        let result = instance.run(&mut context, false).await.unwrap();
        assert_eq!(result.status, WorkflowStepStatus::Failure);
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs[0].spec.name, "error");
        assert!(result.status_reason.as_deref().unwrap().contains("requested failure"));
        // failed step publishes no outputs
        assert_eq!(context.get("s1.echo"), None);
    }

    #[tokio::test]
    async fn test_process_failure_propagates_in_dry_run() {
        let mut context = RunContext::new();
        let mut instance = echo_instance("s1");
        instance
            .bind_inputs(&HashMap::from([
                ("message".to_string(), json!("hi")),
                ("fail".to_string(), json!(true)),
            ]))
            .unwrap();

        let err = instance.run(&mut context, true).await.unwrap_err();
        assert!(matches!(err, StepFailure::Process(_)));
    }

    #[tokio::test]
    async fn test_output_colliding_with_input_is_rejected() {
        struct CollidingStep {
            schema: StepSchema,
        }
        impl CollidingStep {
            fn new() -> Self {
                Self {
                    schema: StepSchema {
                        name: "colliding".to_string(),
                        description: "input and output share a name".to_string(),
                        inputs: vec![Parameter::new("value", ParameterDataType::String)],
                        outputs: vec![Parameter::new("value", ParameterDataType::String)],
                        required_integrations: vec![],
                    },
                }
            }
        }
        impl StepKind for CollidingStep {
            fn schema(&self) -> &StepSchema {
                &self.schema
            }
            async fn execute(
                &self,
                _binding: &StepBinding,
                _dry_run: bool,
            ) -> Result<HashMap<String, Value>, StepError> {
                Ok(HashMap::new())
            }
        }

        let mut context = RunContext::new();
        let mut instance =
            StepInstance::new("s1", Arc::new(BoxStepKind::new(CollidingStep::new())));
        instance
            .bind_inputs(&HashMap::from([("value".to_string(), json!("x"))]))
            .unwrap();

        let err = instance.run(&mut context, true).await.unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_fresh_instances_do_not_share_bindings() {
        let kind = Arc::new(BoxStepKind::new(EchoStep::new()));
        let mut first = StepInstance::new("a", Arc::clone(&kind));
        first
            .bind_inputs(&HashMap::from([("message".to_string(), json!("bound"))]))
            .unwrap();

        let second = StepInstance::new("b", kind);
        assert_eq!(second.binding.input("message").unwrap().value, None);
    }
}
