//! Shared run context.
//!
//! `RunContext` is the mutable state that flows through a workflow run.
//! Every resolved step input and produced step output is published
//! under a flat `"<step>.<parameter>"` key, which is exactly the
//! namespace the `@{step.parameter}` reference grammar addresses.
//! Workflow-level inputs are seeded under the reserved `input` step
//! name before the first step runs.

use std::collections::HashMap;

use serde_json::Value;

use super::resolve::{ReferenceError, resolve_references};

/// Mutable key/value state shared by all steps of one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    values: HashMap<String, Value>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value under `"<step>.<parameter>"`.
    pub fn set(&mut self, step_name: &str, parameter_name: &str, value: Value) {
        let key = format!("{step_name}.{parameter_name}");
        tracing::debug!(%key, "context updated");
        self.values.insert(key, value);
    }

    /// Look up a value by its full `"<step>.<parameter>"` key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Resolve every `@{step.parameter}` reference in `template`.
    pub fn resolve(&self, template: &str, current_step: &str) -> Result<String, ReferenceError> {
        resolve_references(template, &self.values, current_step)
    }

    /// Sorted list of all keys, for diagnostics.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
