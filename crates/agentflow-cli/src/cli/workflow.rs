//! CLI workflow subcommands: generate, validate, and run.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use serde_json::Value;

use agentflow_core::workflow::{StepRegistry, WorkflowDef, validate_workflow_yaml};
use agentflow_types::workflow::{
    WorkflowRunResult, WorkflowRunStatus, WorkflowStepStatus, display_value,
};

const EXAMPLE_WORKFLOW: &str = r#"name: example workflow
description: Drafts a short brief about a topic and echoes it.
inputs:
  - name: topic
    data_type: STRING
    default: "the Rust programming language"
steps:
  - name: draft
    type: llm
    inputs:
      prompt: "Write a three-sentence brief about @{input.topic}"
  - name: publish
    type: dummy
    inputs:
      input: "@{draft.result}"
"#;

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

pub fn handle_generate(output: &Path, json: bool) -> Result<()> {
    std::fs::write(output, EXAMPLE_WORKFLOW)
        .with_context(|| format!("failed to write {}", output.display()))?;

    if json {
        let out = serde_json::json!({ "path": output.display().to_string() });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Generated an example workflow at '{}'",
            style("*").green().bold(),
            style(output.display()).cyan()
        );
        println!(
            "  Validate it with: {}",
            style(format!("aflow validate {}", output.display())).dim()
        );
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn handle_validate(workflow: &Path, registry: &StepRegistry, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(workflow)
        .with_context(|| format!("failed to read {}", workflow.display()))?;

    let issues = validate_workflow_yaml(&content, registry).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else if issues.is_empty() {
        println!();
        println!(
            "  {} '{}' is valid",
            style("✓").green().bold(),
            style(workflow.display()).cyan()
        );
        println!();
    } else {
        println!();
        println!(
            "  {} Validation failed for '{}':",
            style("✗").red().bold(),
            style(workflow.display()).cyan()
        );
        for issue in &issues {
            match &issue.loc {
                Some(loc) => println!("  - [{}] {} ({})", style(loc).yellow(), issue.message, issue.kind),
                None => println!("  - {} ({})", issue.message, issue.kind),
            }
        }
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    workflow: &Path,
    inputs: &[String],
    dry_run: bool,
    registry: &StepRegistry,
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(workflow)
        .with_context(|| format!("failed to read {}", workflow.display()))?;

    let def = WorkflowDef::from_yaml(&content, registry)
        .await
        .map_err(|e| anyhow::anyhow!("invalid workflow: {e}"))?;
    tracing::debug!(workflow = %def.name, dry_run, "workflow loaded");

    let run_inputs = parse_input_pairs(inputs)?;

    let result = if dry_run {
        def.run_dry(registry).await
    } else {
        def.run(registry, &run_inputs).await
    }
    .map_err(|e| anyhow::anyhow!("workflow run failed: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_run_result(&def.name, &result, dry_run);
    }

    Ok(())
}

/// Parse repeated `name=value` flags. Values that parse as JSON keep
/// their type; everything else is taken as a string.
fn parse_input_pairs(pairs: &[String]) -> Result<HashMap<String, Value>> {
    let mut inputs = HashMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("invalid input `{pair}`, expected name=value");
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        inputs.insert(name.to_string(), value);
    }
    Ok(inputs)
}

fn print_run_result(workflow_name: &str, result: &WorkflowRunResult, dry_run: bool) {
    let status = match result.status {
        WorkflowRunStatus::Success => style(result.status.to_string()).green().bold(),
        WorkflowRunStatus::Failure => style(result.status.to_string()).red().bold(),
        _ => style(result.status.to_string()).yellow().bold(),
    };

    println!();
    let mode = if dry_run { " (dry run)" } else { "" };
    println!("  Workflow '{}'{mode}: {status}", style(workflow_name).cyan());
    println!();

    for step in &result.result {
        let mark = match step.status {
            WorkflowStepStatus::Success => style("✓").green(),
            WorkflowStepStatus::Failure => style("✗").red(),
        };
        println!("  {mark} {} ({})", style(&step.step_name).bold(), step.step_type);
        if let Some(reason) = &step.status_reason {
            println!("      {}", style(reason).red());
        }
        if !step.inputs.is_empty() {
            println!("      inputs:");
            for input in &step.inputs {
                let value = input.value.as_ref().map(display_value).unwrap_or_default();
                println!("        {}: {}", input.spec.name, style(value).dim());
            }
        }
        if !step.outputs.is_empty() {
            println!("      outputs:");
            for output in &step.outputs {
                let value = output.value.as_ref().map(display_value).unwrap_or_default();
                println!("        {}: {}", output.spec.name, style(value).dim());
            }
        }
        println!(
            "      {}",
            style(format!(
                "started {} / finished {}",
                step.started_at.format("%H:%M:%S%.3f"),
                step.finished_at.format("%H:%M:%S%.3f")
            ))
            .dim()
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_input_pairs_types() {
        let inputs = parse_input_pairs(&[
            "topic=rust".to_string(),
            "count=3".to_string(),
            "flag=true".to_string(),
            "quoted=\"3\"".to_string(),
        ])
        .unwrap();
        assert_eq!(inputs["topic"], json!("rust"));
        assert_eq!(inputs["count"], json!(3));
        assert_eq!(inputs["flag"], json!(true));
        assert_eq!(inputs["quoted"], json!("3"));
    }

    #[test]
    fn test_parse_input_pairs_rejects_missing_equals() {
        assert!(parse_input_pairs(&["notapair".to_string()]).is_err());
    }

    #[test]
    fn test_parse_input_pairs_keeps_equals_in_value() {
        let inputs = parse_input_pairs(&["expr=a=b".to_string()]).unwrap();
        assert_eq!(inputs["expr"], json!("a=b"));
    }

    #[tokio::test]
    async fn test_example_workflow_is_valid() {
        let issues = validate_workflow_yaml(EXAMPLE_WORKFLOW, &crate::registry()).await;
        assert!(issues.is_empty(), "example workflow has issues: {issues:?}");
    }

    #[tokio::test]
    async fn test_generate_then_validate_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.yml");
        handle_generate(&path, true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let issues = validate_workflow_yaml(&content, &crate::registry()).await;
        assert!(issues.is_empty());
    }
}
