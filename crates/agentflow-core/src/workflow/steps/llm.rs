//! The `llm` step: sends a prompt to a language model and captures the
//! response.
//!
//! With a single output the raw completion is returned under that
//! output's name. With multiple outputs (requested via the
//! comma-separated `output_names` input) the prompt is extended with an
//! instruction to answer in JSON keyed by those names; if the response
//! does not parse as a JSON object, the full completion text is
//! duplicated into every requested output so the step still produces
//! something usable.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use agentflow_types::llm::{CompletionRequest, Message};
use agentflow_types::workflow::{Parameter, ParameterDataType};

use crate::llm::BoxLlmProvider;
use crate::workflow::step::{StepBinding, StepError, StepKind, StepSchema};

/// Token ceiling for a single completion.
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct LlmStep {
    schema: StepSchema,
    provider: Arc<BoxLlmProvider>,
}

impl LlmStep {
    pub fn new(provider: Arc<BoxLlmProvider>) -> Self {
        Self {
            schema: StepSchema {
                name: "llm".to_string(),
                description: "Sends a prompt to a language model and captures the response."
                    .to_string(),
                inputs: vec![
                    Parameter::new("prompt", ParameterDataType::String)
                        .with_description("The prompt sent to the model")
                        .invisible(),
                    Parameter::new("model", ParameterDataType::Option)
                        .with_choices(["gpt-4o", "gpt-4o-mini"])
                        .with_default("gpt-4o")
                        .with_description("Model to use"),
                    Parameter::new("chat_history", ParameterDataType::Boolean)
                        .optional()
                        .with_default(false)
                        .with_description("Whether to include prior chat history (reserved)"),
                    Parameter::new("system_message", ParameterDataType::String)
                        .optional()
                        .with_default("")
                        .with_description("System message sent before the prompt"),
                    Parameter::new("output_names", ParameterDataType::Output)
                        .optional()
                        .with_default("")
                        .with_description(
                            "Comma-separated output names, e.g. \"summary, keywords, sentiment\"",
                        ),
                ],
                outputs: vec![Parameter::new("result", ParameterDataType::String)],
                required_integrations: vec!["openai".to_string()],
            },
            provider,
        }
    }

    async fn completion(
        &self,
        binding: &StepBinding,
        prompt: String,
        model: String,
    ) -> Result<String, StepError> {
        let system = binding
            .resolved_string("system_message")
            .filter(|s| !s.is_empty());
        let request = CompletionRequest {
            model,
            messages: vec![Message::user(prompt)],
            system,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        };
        let response = self.provider.complete(&request).await?;
        Ok(response.content)
    }
}

impl StepKind for LlmStep {
    fn schema(&self) -> &StepSchema {
        &self.schema
    }

    /// `output_names` replaces the static `result` output when given.
    fn plan_outputs(&self, binding: &StepBinding) -> Vec<Parameter> {
        let requested: Vec<String> = binding
            .resolved_string("output_names")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if requested.is_empty() {
            return self.schema.outputs.clone();
        }
        requested
            .into_iter()
            .map(|name| Parameter::new(name, ParameterDataType::String))
            .collect()
    }

    async fn execute(
        &self,
        binding: &StepBinding,
        dry_run: bool,
    ) -> Result<HashMap<String, Value>, StepError> {
        let prompt = binding
            .resolved_string("prompt")
            .ok_or_else(|| StepError::MissingInput("prompt".to_string()))?;
        let model = binding
            .resolved_string("model")
            .ok_or_else(|| StepError::MissingInput("model".to_string()))?;
        let output_names = binding.output_names();

        if dry_run {
            return Ok(output_names
                .into_iter()
                .map(|name| {
                    let placeholder = format!("This is the {name} of the LLM dry run");
                    (name, Value::String(placeholder))
                })
                .collect());
        }

        if output_names.len() <= 1 {
            let key = output_names
                .into_iter()
                .next()
                .unwrap_or_else(|| "result".to_string());
            let completion = self.completion(binding, prompt, model).await?;
            return Ok(HashMap::from([(key, Value::String(completion))]));
        }

        let modified_prompt = format!(
            "{prompt}\n\n\
             Please provide your response in JSON format with the following keys: {}. \
             Important: Return only the JSON object, no markdown, no code blocks.",
            output_names.join(", ")
        );
        let completion = self.completion(binding, modified_prompt, model).await?;

        match serde_json::from_str::<Value>(&completion) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            // Fallback: duplicate the full response into every requested
            // output so the step still produces something usable.
            _ => {
                tracing::warn!(step_type = "llm", "response was not a JSON object, duplicating");
                Ok(output_names
                    .into_iter()
                    .map(|name| (name, Value::String(completion.clone())))
                    .collect())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
