//! Value reference resolution for `@{step.parameter}` templates.
//!
//! A template is scanned once, left to right, into literal and
//! reference segments. Each reference is replaced by the context value
//! it names. Substituted text is never rescanned, so a value that
//! happens to contain `@{...}` stays inert instead of triggering a
//! second round of resolution.
//!
//! Reference grammar: `@{` then a step name, `.`, and a parameter name,
//! then `}`. Names are `[A-Za-z0-9_]+` and may be padded with spaces.
//! Anything that does not match the grammar (no closing brace, bad
//! characters, missing dot) is left in the output verbatim.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use agentflow_types::workflow::display_value;

/// A reference named a context key that does not exist.
#[derive(Debug, Error)]
#[error(
    "value for {step_name}.{reference} not found, available variables are: {}",
    available.join(", ")
)]
pub struct ReferenceError {
    /// Step whose input was being resolved.
    pub step_name: String,
    /// The `step.parameter` key that could not be found.
    pub reference: String,
    /// Sorted context keys that were available at resolution time.
    pub available: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Reference(String),
}

/// Scan a name (`[A-Za-z0-9_]+`) with optional surrounding spaces.
/// Returns the name's byte range and leaves `pos` after any trailing
/// spaces.
fn scan_name(bytes: &[u8], pos: &mut usize) -> Option<(usize, usize)> {
    while bytes.get(*pos) == Some(&b' ') {
        *pos += 1;
    }
    let start = *pos;
    while matches!(bytes.get(*pos), Some(b) if b.is_ascii_alphanumeric() || *b == b'_') {
        *pos += 1;
    }
    if *pos == start {
        return None;
    }
    let end = *pos;
    while bytes.get(*pos) == Some(&b' ') {
        *pos += 1;
    }
    Some((start, end))
}

/// Parse `step.parameter}` starting just after `@{`. Returns the
/// normalized `step.parameter` key and the byte offset past the
/// closing brace.
fn scan_reference(template: &str, start: usize) -> Option<(String, usize)> {
    let bytes = template.as_bytes();
    let mut pos = start;
    let (step_start, step_end) = scan_name(bytes, &mut pos)?;
    if bytes.get(pos) != Some(&b'.') {
        return None;
    }
    pos += 1;
    let (param_start, param_end) = scan_name(bytes, &mut pos)?;
    if bytes.get(pos) != Some(&b'}') {
        return None;
    }
    let key = format!(
        "{}.{}",
        &template[step_start..step_end],
        &template[param_start..param_end]
    );
    Some((key, pos + 1))
}

fn scan(template: &str) -> Vec<Segment<'_>> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'@'
            && bytes.get(i + 1) == Some(&b'{')
            && let Some((key, end)) = scan_reference(template, i + 2)
        {
            if literal_start < i {
                segments.push(Segment::Literal(&template[literal_start..i]));
            }
            segments.push(Segment::Reference(key));
            i = end;
            literal_start = i;
            continue;
        }
        i += 1;
    }
    if literal_start < template.len() {
        segments.push(Segment::Literal(&template[literal_start..]));
    }
    segments
}

/// Substitute every `@{step.parameter}` reference in `template` with
/// the matching context value, rendered as a string. `current_step` is
/// the step whose input is being resolved and is only used for error
/// reporting.
pub fn resolve_references(
    template: &str,
    context: &HashMap<String, Value>,
    current_step: &str,
) -> Result<String, ReferenceError> {
    let mut out = String::with_capacity(template.len());
    for segment in scan(template) {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Reference(key) => match context.get(&key) {
                Some(value) => out.push_str(&display_value(value)),
                None => {
                    let mut available: Vec<String> = context.keys().cloned().collect();
                    available.sort();
                    return Err(ReferenceError {
                        step_name: current_step.to_string(),
                        reference: key,
                        available,
                    });
                }
            },
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_plain_text_passes_through() {
        let context = ctx(&[]);
        let out = resolve_references("no references here", &context, "s").unwrap();
        assert_eq!(out, "no references here");
    }

    #[test]
    fn test_single_reference() {
        let context = ctx(&[("step1.output", json!("hello"))]);
        let out = resolve_references("say: @{step1.output}!", &context, "s").unwrap();
        assert_eq!(out, "say: hello!");
    }

    #[test]
    fn test_multiple_references() {
        let context = ctx(&[("a.x", json!("1")), ("b.y", json!("2"))]);
        let out = resolve_references("@{a.x} and @{b.y}", &context, "s").unwrap();
        assert_eq!(out, "1 and 2");
    }

    #[test]
    fn test_spaces_inside_braces() {
        let context = ctx(&[("step1.output", json!("ok"))]);
        let out = resolve_references("@{ step1 . output }", &context, "s").unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_non_string_values_are_rendered() {
        let context = ctx(&[("calc.total", json!(42)), ("flag.on", json!(true))]);
        let out = resolve_references("@{calc.total}/@{flag.on}", &context, "s").unwrap();
        assert_eq!(out, "42/true");
    }

    #[test]
    fn test_unknown_reference_errors_with_available_keys() {
        let context = ctx(&[("a.x", json!("1")), ("a.y", json!("2"))]);
        let err = resolve_references("@{missing.key}", &context, "step2").unwrap_err();
        assert_eq!(err.step_name, "step2");
        assert_eq!(err.reference, "missing.key");
        assert_eq!(err.available, vec!["a.x".to_string(), "a.y".to_string()]);
        assert!(err.to_string().contains("step2.missing.key"));
    }

    #[test]
    fn test_substituted_text_is_not_rescanned() {
        // the value itself looks like a reference but must stay inert
        let context = ctx(&[("a.x", json!("@{b.y}")), ("b.y", json!("inner"))]);
        let out = resolve_references("@{a.x}", &context, "s").unwrap();
        assert_eq!(out, "@{b.y}");
    }

    #[test]
    fn test_malformed_references_stay_literal() {
        let context = ctx(&[("a.x", json!("v"))]);
        for template in ["@{a.x", "@{}", "@{a}", "@{a..x}", "@{a-b.x}", "@ {a.x}"] {
            let out = resolve_references(template, &context, "s").unwrap();
            assert_eq!(out, template);
        }
    }

    #[test]
    fn test_adjacent_references() {
        let context = ctx(&[("a.x", json!("1")), ("a.y", json!("2"))]);
        let out = resolve_references("@{a.x}@{a.y}", &context, "s").unwrap();
        assert_eq!(out, "12");
    }

    #[test]
    fn test_literal_after_malformed_then_valid_reference() {
        let context = ctx(&[("a.x", json!("v"))]);
        let out = resolve_references("@{bad @{a.x}", &context, "s").unwrap();
        assert_eq!(out, "@{bad v");
    }
}
