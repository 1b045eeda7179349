//! CLI listing of the available step types.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};

use agentflow_core::workflow::StepRegistry;
use agentflow_types::workflow::Parameter;

pub fn handle_steps(registry: &StepRegistry, json: bool) -> Result<()> {
    let schemas = registry.schemas();

    if json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Type").fg(Color::Cyan),
            Cell::new("Description"),
            Cell::new("Inputs"),
            Cell::new("Outputs"),
            Cell::new("Integrations"),
        ]);

    for schema in schemas {
        table.add_row(vec![
            Cell::new(&schema.name),
            Cell::new(&schema.description),
            Cell::new(parameter_lines(&schema.inputs)),
            Cell::new(parameter_lines(&schema.outputs)),
            Cell::new(schema.required_integrations.join("\n")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn parameter_lines(parameters: &[Parameter]) -> String {
    parameters
        .iter()
        .map(|p| {
            let optional = if p.optional { " (optional)" } else { "" };
            format!("{}: {}{optional}", p.name, p.data_type)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_types::workflow::ParameterDataType;

    #[test]
    fn test_parameter_lines_marks_optional() {
        let lines = parameter_lines(&[
            Parameter::new("prompt", ParameterDataType::String),
            Parameter::new("system_message", ParameterDataType::String).optional(),
        ]);
        assert_eq!(lines, "prompt: STRING\nsystem_message: STRING (optional)");
    }
}
