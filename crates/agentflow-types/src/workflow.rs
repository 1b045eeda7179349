//! Workflow domain types for Agentflow.
//!
//! Defines the typed parameter model shared by step schemas, workflow
//! inputs, and result records. The model is split in two: [`Parameter`]
//! is the immutable schema declaration owned by a step type, and
//! [`BoundParameter`] is the per-instance binding that carries a value.
//! Step instances always work on fresh bindings, so binding a value on
//! one instance can never leak into the schema or another instance.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Declared data type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterDataType {
    String,
    Markdown,
    Number,
    Boolean,
    Object,
    Datetime,
    File,
    Option,
    Output,
}

impl fmt::Display for ParameterDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterDataType::String => "STRING",
            ParameterDataType::Markdown => "MARKDOWN",
            ParameterDataType::Number => "NUMBER",
            ParameterDataType::Boolean => "BOOLEAN",
            ParameterDataType::Object => "OBJECT",
            ParameterDataType::Datetime => "DATETIME",
            ParameterDataType::File => "FILE",
            ParameterDataType::Option => "OPTION",
            ParameterDataType::Output => "OUTPUT",
        };
        write!(f, "{s}")
    }
}

/// Content type of a FILE parameter, serialized as its MIME string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileContentType {
    #[serde(rename = "application/pdf")]
    Pdf,
    #[serde(rename = "audio/mpeg")]
    Mp3,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "text/calendar")]
    Ics,
}

/// How much a caller may do with a workflow-level input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputPermissionLevel {
    ReadOnly,
    #[default]
    ReadWrite,
    NoAccess,
}

/// Outcome of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStepStatus {
    Success,
    Failure,
}

impl fmt::Display for WorkflowStepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStepStatus::Success => write!(f, "SUCCESS"),
            WorkflowStepStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Aggregate outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowRunStatus {
    Submitted,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowRunStatus::Submitted => "SUBMITTED",
            WorkflowRunStatus::Running => "RUNNING",
            WorkflowRunStatus::Success => "SUCCESS",
            WorkflowRunStatus::Failure => "FAILURE",
            WorkflowRunStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Invariant violations in parameter declarations and bindings.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("content type is required for file parameter `{name}`")]
    MissingContentType { name: String },

    #[error("choices are required for option parameter `{name}`")]
    MissingChoices { name: String },

    #[error("default value `{default}` for `{name}` is not in the list of choices {choices:?}")]
    DefaultNotInChoices {
        name: String,
        default: String,
        choices: Vec<String>,
    },

    #[error("value `{value}` for `{name}` is not in the list of choices {choices:?}")]
    ValueNotInChoices {
        name: String,
        value: String,
        choices: Vec<String>,
    },

    #[error("default value is required for non-writable input `{name}`")]
    DefaultRequired { name: String },
}

// ---------------------------------------------------------------------------
// Parameter (schema declaration)
// ---------------------------------------------------------------------------

/// A named, typed parameter slot as declared by a step type or a
/// workflow input list.
///
/// This is immutable schema data. A value is never stored here; binding
/// happens on a per-instance [`BoundParameter`] built from this
/// declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub data_type: ParameterDataType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<FileContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub invisible: bool,
    #[serde(default)]
    pub mention_data_only: bool,
}

impl Parameter {
    /// Declare a required parameter.
    pub fn new(name: impl Into<String>, data_type: ParameterDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            optional: false,
            default: None,
            description: None,
            content_type: None,
            choices: None,
            invisible: false,
            mention_data_only: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_content_type(mut self, content_type: FileContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    /// Check the declaration-level invariants: a FILE parameter must
    /// carry a content type, an OPTION parameter must carry a non-empty
    /// choice set and its default (if any) must belong to that set.
    pub fn validate_spec(&self) -> Result<(), ParameterError> {
        match self.data_type {
            ParameterDataType::File => {
                if self.content_type.is_none() {
                    return Err(ParameterError::MissingContentType {
                        name: self.name.clone(),
                    });
                }
            }
            ParameterDataType::Option => {
                let choices = match &self.choices {
                    Some(c) if !c.is_empty() => c,
                    _ => {
                        return Err(ParameterError::MissingChoices {
                            name: self.name.clone(),
                        });
                    }
                };
                if let Some(default) = &self.default {
                    let default_str = display_value(default);
                    if !choices.contains(&default_str) {
                        return Err(ParameterError::DefaultNotInChoices {
                            name: self.name.clone(),
                            default: default_str,
                            choices: choices.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Create an unbound per-instance binding from this declaration.
    pub fn bind(&self) -> BoundParameter {
        BoundParameter {
            spec: self.clone(),
            value: None,
        }
    }
}

// ---------------------------------------------------------------------------
// BoundParameter (per-instance binding)
// ---------------------------------------------------------------------------

/// A parameter binding owned by one step instance (or one workflow run's
/// input set). Serializes flat, so result records carry the declaration
/// fields and the bound value side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    #[serde(flatten)]
    pub spec: Parameter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl BoundParameter {
    /// Bind a value, enforcing the OPTION choice-set invariant.
    pub fn set_value(&mut self, value: Value) -> Result<(), ParameterError> {
        if self.spec.data_type == ParameterDataType::Option
            && !value.is_null()
            && let Some(choices) = &self.spec.choices
        {
            let value_str = display_value(&value);
            if !choices.contains(&value_str) {
                return Err(ParameterError::ValueNotInChoices {
                    name: self.spec.name.clone(),
                    value: value_str,
                    choices: choices.clone(),
                });
            }
        }
        self.value = Some(value);
        Ok(())
    }

    /// The bound value if set, otherwise the declared default, coerced
    /// to the declared data type for STRING (stringified), NUMBER
    /// (parsed to float), and BOOLEAN (truthy-cast). Other data types
    /// pass through unconverted. `null` counts as unset.
    pub fn resolved_value(&self) -> Option<Value> {
        let raw = self.value.as_ref().or(self.spec.default.as_ref())?;
        if raw.is_null() {
            return None;
        }
        let coerced = match self.spec.data_type {
            ParameterDataType::String => Value::String(display_value(raw)),
            ParameterDataType::Number => match coerce_number(raw) {
                Some(n) => serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or_else(|| raw.clone()),
                None => raw.clone(),
            },
            ParameterDataType::Boolean => Value::Bool(truthy(raw)),
            _ => raw.clone(),
        };
        Some(coerced)
    }

    /// Fixed placeholder used when simulating a run.
    ///
    /// Defined only for STRING ("dummy"), NUMBER (0), and BOOLEAN
    /// (false). Calling this for any other data type is a programmer
    /// error in step code, not bad user input.
    pub fn dry_run_value(&self) -> Value {
        match self.spec.data_type {
            ParameterDataType::String => Value::String("dummy".to_string()),
            ParameterDataType::Number => Value::from(0),
            ParameterDataType::Boolean => Value::Bool(false),
            other => panic!(
                "dry-run placeholder is only defined for STRING, NUMBER and BOOLEAN \
                 parameters (parameter `{}` is {other})",
                self.spec.name
            ),
        }
    }

    /// Validate the current binding against the declaration. Returns
    /// human-readable error strings: missing required value, or a
    /// value/declared-type mismatch (coercion is attempted for NUMBER
    /// and BOOLEAN before a mismatch is flagged).
    pub fn validate_value(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let value = self.value.as_ref().filter(|v| !v.is_null());

        if value.is_none() && !self.spec.optional {
            errors.push(format!("parameter `{}` is required", self.spec.name));
        }

        if let Some(v) = value {
            match self.spec.data_type {
                ParameterDataType::String => {
                    if !v.is_string() {
                        errors.push(format!(
                            "invalid data type for `{}`: {v}, expected string",
                            self.spec.name
                        ));
                    }
                }
                ParameterDataType::Number => {
                    if coerce_number(v).is_none() {
                        errors.push(format!(
                            "invalid data type for `{}`: {v}, expected number",
                            self.spec.name
                        ));
                    }
                }
                ParameterDataType::Boolean => {
                    if coerce_bool(v).is_none() {
                        errors.push(format!(
                            "invalid data type for `{}`: {v}, expected boolean",
                            self.spec.name
                        ));
                    }
                }
                _ => {}
            }
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// InputParameter (workflow-level)
// ---------------------------------------------------------------------------

/// A workflow-level input: a parameter declaration plus the caller's
/// permission to override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParameter {
    #[serde(flatten)]
    pub parameter: Parameter,
    #[serde(default)]
    pub user_permission: InputPermissionLevel,
}

impl InputParameter {
    /// Check declaration invariants, including the workflow-input rule
    /// that a non-READ_WRITE input must carry a default value.
    pub fn validate_spec(&self) -> Result<(), ParameterError> {
        self.parameter.validate_spec()?;
        if self.user_permission != InputPermissionLevel::ReadWrite
            && self.parameter.default.is_none()
        {
            return Err(ParameterError::DefaultRequired {
                name: self.parameter.name.clone(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

/// Immutable record of one step's outcome within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepResult {
    pub step_name: String,
    pub step_type: String,
    pub status: WorkflowStepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub inputs: Vec<BoundParameter>,
    pub outputs: Vec<BoundParameter>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Immutable record of a whole workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub status: WorkflowRunStatus,
    pub result: Vec<WorkflowStepResult>,
}

// ---------------------------------------------------------------------------
// Validation issues
// ---------------------------------------------------------------------------

/// Machine-readable category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationIssueKind {
    YamlError,
    InvalidWorkflow,
    ExtraField,
    InvalidStepType,
    ReservedStepName,
    MissingInput,
    ExtraInput,
    InvalidParameter,
    ValueReference,
    MissingWorkflowInput,
    ImmutableWorkflowInput,
    InvalidWorkflowInput,
    WorkflowError,
}

impl fmt::Display for ValidationIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationIssueKind::YamlError => "yaml_error",
            ValidationIssueKind::InvalidWorkflow => "invalid_workflow",
            ValidationIssueKind::ExtraField => "extra_field",
            ValidationIssueKind::InvalidStepType => "invalid_step_type",
            ValidationIssueKind::ReservedStepName => "reserved_step_name",
            ValidationIssueKind::MissingInput => "missing_input",
            ValidationIssueKind::ExtraInput => "extra_input",
            ValidationIssueKind::InvalidParameter => "invalid_parameter",
            ValidationIssueKind::ValueReference => "value_reference",
            ValidationIssueKind::MissingWorkflowInput => "missing_workflow_input",
            ValidationIssueKind::ImmutableWorkflowInput => "immutable_workflow_input",
            ValidationIssueKind::InvalidWorkflowInput => "invalid_workflow_input",
            ValidationIssueKind::WorkflowError => "workflow_error",
        };
        write!(f, "{s}")
    }
}

/// One structured validation error, with a location (workflow field,
/// step name, or input name) when one is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,
    pub message: String,
    pub kind: ValidationIssueKind,
}

impl ValidationIssue {
    pub fn new(
        kind: ValidationIssueKind,
        loc: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            loc,
            message: message.into(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Render a JSON value as the string a user would expect to see in an
/// interpolated template or a stringified parameter.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Objects and arrays render as compact JSON
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// JavaScript-like truthiness used for BOOLEAN coercion.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
