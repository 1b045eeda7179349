//! Workflow definition parsing, validation, and the run loop.
//!
//! A workflow document looks like:
//!
//! ```yaml
//! name: research brief
//! inputs:
//!   - name: topic
//!     data_type: STRING
//! steps:
//!   - name: draft
//!     type: llm
//!     inputs:
//!       prompt: "Write a brief about @{input.topic}"
//!   - name: publish
//!     type: dummy
//!     inputs:
//!       input: "@{draft.result}"
//! ```
//!
//! Validation is two-phase. Structural checks (field names, step types,
//! reserved names, declared inputs) run first; the definition is then
//! exercised end to end in dry-run mode, which catches broken
//! `@{...}` references and step contract violations before anything
//! real executes. A `WorkflowDef` that constructs successfully is
//! guaranteed runnable.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use agentflow_types::workflow::{
    BoundParameter, InputParameter, InputPermissionLevel, ParameterDataType, ParameterError,
    ValidationIssue, ValidationIssueKind, WorkflowRunResult, WorkflowRunStatus, WorkflowStepResult,
    WorkflowStepStatus,
};

use super::context::RunContext;
use super::registry::StepRegistry;
use super::resolve::ReferenceError;
use super::step::{StepFailure, StepInstance};

/// Step name under which workflow inputs are published to the context.
/// No step may claim it.
pub const RESERVED_INPUT_STEP_NAME: &str = "input";

const WORKFLOW_FIELDS: [&str; 5] = ["name", "description", "inputs", "steps", "layout_attributes"];
const STEP_FIELDS: [&str; 4] = ["name", "type", "description", "inputs"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("error parsing yaml: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("workflow definition should be a mapping")]
    NotAMapping,

    #[error("extra workflow field `{0}` found")]
    ExtraField(String),

    #[error("extra field `{field}` found in step `{step}`")]
    ExtraStepField { step: String, field: String },

    #[error("step type `{0}` not found")]
    UnknownStepType(String),

    #[error("step name `{0}` is reserved for workflow inputs")]
    ReservedStepName(String),

    #[error("step input value `{input}` required in step `{step}`")]
    MissingInput { step: String, input: String },

    #[error("extra input fields `{inputs}` found in step `{step}`")]
    ExtraInput { step: String, inputs: String },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("incorrect variable reference: {0}")]
    Reference(#[from] ReferenceError),

    #[error("error running workflow in dry run mode: {0}")]
    DryRun(String),
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// One step occurrence in a workflow document: a unique instance name,
/// a registered step type alias, and raw input values (literals or
/// `@{...}` templates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
}

/// A validated workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputParameter>,
    pub steps: Vec<WorkflowStep>,
    /// Opaque UI layout data, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_attributes: Option<Value>,
}

impl WorkflowDef {
    /// Parse and fully validate a workflow document against a step
    /// registry. Structural checks run first; the definition is then
    /// simulated in dry-run mode and rejected if any step would fail.
    pub async fn from_yaml(yaml: &str, registry: &StepRegistry) -> Result<Self, WorkflowError> {
        let def = Self::parse(yaml)?;
        def.validate_structure(registry)?;
        def.dry_run(registry).await?;
        Ok(def)
    }

    /// Parse the document without running any validation. Useful for
    /// tooling that needs to inspect broken workflows.
    pub fn parse(yaml: &str) -> Result<Self, WorkflowError> {
        let raw: serde_yaml_ng::Value = serde_yaml_ng::from_str(yaml)?;
        let mapping = raw.as_mapping().ok_or(WorkflowError::NotAMapping)?;

        for key in mapping.keys() {
            let field = key.as_str().unwrap_or_default();
            if !WORKFLOW_FIELDS.contains(&field) {
                return Err(WorkflowError::ExtraField(field.to_string()));
            }
        }
        if let Some(steps) = mapping.get("steps").and_then(|v| v.as_sequence()) {
            for step in steps {
                let Some(step_mapping) = step.as_mapping() else {
                    continue;
                };
                let step_name = step_mapping
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                for key in step_mapping.keys() {
                    let field = key.as_str().unwrap_or_default();
                    if !STEP_FIELDS.contains(&field) {
                        return Err(WorkflowError::ExtraStepField {
                            step: step_name.to_string(),
                            field: field.to_string(),
                        });
                    }
                }
            }
        }

        Ok(serde_yaml_ng::from_value(raw)?)
    }

    fn validate_structure(&self, registry: &StepRegistry) -> Result<(), WorkflowError> {
        for input in &self.inputs {
            input.validate_spec()?;
        }
        for step in &self.steps {
            if step.name == RESERVED_INPUT_STEP_NAME {
                return Err(WorkflowError::ReservedStepName(step.name.clone()));
            }
            let kind = registry
                .get(&step.step_type)
                .ok_or_else(|| WorkflowError::UnknownStepType(step.step_type.clone()))?;
            let schema = kind.schema();

            for declared in &schema.inputs {
                if !declared.optional && !step.inputs.contains_key(&declared.name) {
                    return Err(WorkflowError::MissingInput {
                        step: step.name.clone(),
                        input: declared.name.clone(),
                    });
                }
            }

            let known: HashSet<&str> = schema.inputs.iter().map(|p| p.name.as_str()).collect();
            let mut extra: Vec<&str> = step
                .inputs
                .keys()
                .map(String::as_str)
                .filter(|k| !known.contains(k))
                .collect();
            if !extra.is_empty() {
                extra.sort();
                return Err(WorkflowError::ExtraInput {
                    step: step.name.clone(),
                    inputs: extra.join(", "),
                });
            }
        }
        Ok(())
    }

    async fn dry_run(&self, registry: &StepRegistry) -> Result<(), WorkflowError> {
        self.run_dry(registry).await?;
        Ok(())
    }

    /// Execute the workflow in dry-run mode: placeholder input values,
    /// no external calls. This is the simulation the constructor runs;
    /// it is also useful on its own to preview a workflow.
    pub async fn run_dry(&self, registry: &StepRegistry) -> Result<WorkflowRunResult, WorkflowError> {
        self.run_with(registry, &HashMap::new(), true).await
    }

    /// Execute the workflow with caller-supplied input values.
    ///
    /// Inputs are permission-checked and validated first; any violation
    /// produces a run that failed at a synthetic `input` step. Step
    /// failures are isolated: the failing step gets a FAILURE record
    /// and execution continues with the remaining steps.
    pub async fn run(
        &self,
        registry: &StepRegistry,
        run_inputs: &HashMap<String, Value>,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        self.run_with(registry, run_inputs, false).await
    }

    /// External integrations the workflow's steps need at run time,
    /// deduplicated and sorted. Unknown step types are skipped; they
    /// are rejected by validation anyway.
    pub fn required_integrations(&self, registry: &StepRegistry) -> Vec<String> {
        let mut integrations: Vec<String> = self
            .steps
            .iter()
            .filter_map(|step| registry.get(&step.step_type))
            .flat_map(|kind| kind.schema().required_integrations.clone())
            .collect();
        integrations.sort();
        integrations.dedup();
        integrations
    }

    async fn run_with(
        &self,
        registry: &StepRegistry,
        run_inputs: &HashMap<String, Value>,
        dry_run: bool,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        tracing::debug!(workflow = %self.name, dry_run, "starting workflow run");
        let started_at = Utc::now();

        // Bind and validate workflow inputs.
        let mut bound_inputs: Vec<BoundParameter> = Vec::with_capacity(self.inputs.len());
        let mut input_errors: Vec<String> = Vec::new();
        for input in &self.inputs {
            let mut bound = input.parameter.bind();
            let value = if dry_run {
                dry_run_seed(input)
            } else {
                let provided = run_inputs.get(&input.parameter.name).cloned();
                if let Some(v) = &provided
                    && input.user_permission != InputPermissionLevel::ReadWrite
                    && Some(v) != input.parameter.default.as_ref()
                {
                    input_errors.push(format!(
                        "parameter `{}` is immutable",
                        input.parameter.name
                    ));
                }
                provided.or_else(|| input.parameter.default.clone())
            };
            if let Some(v) = value
                && let Err(e) = bound.set_value(v)
            {
                input_errors.push(e.to_string());
            }
            input_errors.extend(bound.validate_value());
            bound_inputs.push(bound);
        }

        if !input_errors.is_empty() {
            let reason = input_errors.join("; ");
            if dry_run {
                return Err(WorkflowError::DryRun(reason));
            }
            return Ok(WorkflowRunResult {
                status: WorkflowRunStatus::Failure,
                result: vec![WorkflowStepResult {
                    step_name: RESERVED_INPUT_STEP_NAME.to_string(),
                    step_type: RESERVED_INPUT_STEP_NAME.to_string(),
                    status: WorkflowStepStatus::Failure,
                    status_reason: Some(reason),
                    inputs: vec![],
                    outputs: vec![],
                    started_at,
                    finished_at: Utc::now(),
                }],
            });
        }

        // Seed the context with the coerced input values.
        let mut context = RunContext::new();
        for bound in &bound_inputs {
            if let Some(value) = bound.resolved_value() {
                context.set(RESERVED_INPUT_STEP_NAME, &bound.spec.name, value);
            }
        }

        // Run the steps in declaration order, on fresh instances.
        let mut results = Vec::with_capacity(self.steps.len());
        let mut status = WorkflowRunStatus::Success;
        for step in &self.steps {
            let mut instance = registry
                .instantiate(&step.step_type, &step.name)
                .ok_or_else(|| WorkflowError::UnknownStepType(step.step_type.clone()))?;

            let step_started_at = Utc::now();
            let outcome = match instance.bind_inputs(&step.inputs) {
                Ok(()) => instance.run(&mut context, dry_run).await,
                Err(e) => Err(StepFailure::Process(e)),
            };
            match outcome {
                Ok(result) => {
                    if result.status == WorkflowStepStatus::Failure {
                        status = WorkflowRunStatus::Failure;
                    }
                    results.push(result);
                }
                Err(failure) if dry_run => {
                    return Err(match failure {
                        StepFailure::Reference(e) => WorkflowError::Reference(e),
                        StepFailure::Process(e) => WorkflowError::DryRun(e.to_string()),
                    });
                }
                Err(failure) => {
                    status = WorkflowRunStatus::Failure;
                    results.push(instance.failure_result(step_started_at, &failure));
                }
            }
        }

        tracing::debug!(workflow = %self.name, %status, "workflow run finished");
        Ok(WorkflowRunResult {
            status,
            result: results,
        })
    }
}

/// Input value used for the dry-run simulation. Non-writable inputs use
/// their declared default (guaranteed present by spec validation) so
/// the permission rules hold; writable STRING/NUMBER/BOOLEAN inputs get
/// the fixed placeholder; everything else falls back to its default.
fn dry_run_seed(input: &InputParameter) -> Option<Value> {
    if input.user_permission != InputPermissionLevel::ReadWrite {
        return input.parameter.default.clone();
    }
    match input.parameter.data_type {
        ParameterDataType::String
        | ParameterDataType::Number
        | ParameterDataType::Boolean => Some(input.parameter.bind().dry_run_value()),
        _ => input.parameter.default.clone(),
    }
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

/// Validate a workflow document and report problems as structured
/// issues instead of an error.
pub async fn validate_workflow_yaml(yaml: &str, registry: &StepRegistry) -> Vec<ValidationIssue> {
    match WorkflowDef::from_yaml(yaml, registry).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![issue_for(e)],
    }
}

fn issue_for(error: WorkflowError) -> ValidationIssue {
    let message = error.to_string();
    let (kind, loc) = match &error {
        WorkflowError::Yaml(_) => (ValidationIssueKind::YamlError, None),
        WorkflowError::NotAMapping => (ValidationIssueKind::InvalidWorkflow, None),
        WorkflowError::ExtraField(field) => {
            (ValidationIssueKind::ExtraField, Some(field.clone()))
        }
        WorkflowError::ExtraStepField { step, field } => (
            ValidationIssueKind::ExtraField,
            Some(format!("{step}.{field}")),
        ),
        WorkflowError::UnknownStepType(step_type) => (
            ValidationIssueKind::InvalidStepType,
            Some(step_type.clone()),
        ),
        WorkflowError::ReservedStepName(name) => {
            (ValidationIssueKind::ReservedStepName, Some(name.clone()))
        }
        WorkflowError::MissingInput { step, input } => (
            ValidationIssueKind::MissingInput,
            Some(format!("{step}.{input}")),
        ),
        WorkflowError::ExtraInput { step, .. } => {
            (ValidationIssueKind::ExtraInput, Some(step.clone()))
        }
        WorkflowError::Parameter(_) => (ValidationIssueKind::InvalidParameter, None),
        WorkflowError::Reference(e) => (
            ValidationIssueKind::ValueReference,
            Some(e.step_name.clone()),
        ),
        WorkflowError::DryRun(_) => (ValidationIssueKind::WorkflowError, None),
    };
    ValidationIssue::new(kind, loc, message)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
