// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Init command - write a starter pipeline definition

use colored::Colorize;
use miette::Result;
use std::path::Path;

use crate::pipeline::{DefinitionValidator, PipelineDefinition};

/// File written by `tierflow init`
pub const DEFAULT_DEFINITION: &str = "pipeline.yaml";

const STARTER_TEMPLATE: &str = r#"# tierflow pipeline definition
#
# Stages run in the order listed. `${output_dir}` expands to the directory
# passed with -o/--output. Shell stages see their parameters as
# TIERFLOW_<NAME> environment variables and run inside the output root.

id: "{id}"
display_name: "{id}"
version: "1"

config:
  stop_on_error: true
  # stage_timeout_secs: 600

stages:
  - name: silver
    description: "Bronze to silver: consolidate the raw input files"
    unit: shell
    with:
      command: |
        mkdir -p silver
        cat $TIERFLOW_FILES > silver/consolidated.csv
    inputs:
      files: { from_run: files }
    outputs:
      - path_template: "${output_dir}/silver/consolidated.csv"
        key: consolidated

  - name: gold
    description: "Silver to gold: deduplicate and report"
    unit: shell
    with:
      command: |
        mkdir -p gold
        sort -u "$TIERFLOW_SOURCE" > gold/report.csv
        echo "{\"success\": true, \"rows\": $(wc -l < gold/report.csv)}"
    inputs:
      source: { from_stage: silver, output_key: consolidated }
    outputs:
      - path_template: "${output_dir}/gold/report.csv"
        key: report
"#;

/// Render the starter definition for a pipeline id
pub fn starter_definition(id: &str) -> String {
    STARTER_TEMPLATE.replace("{id}", id)
}

/// Run the init command
pub async fn run(name: Option<String>, force: bool, verbose: bool) -> Result<()> {
    let id = name.unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "my-pipeline".to_string())
    });

    println!("{}", "Initializing tierflow pipeline...".bold());
    println!();

    let path = Path::new(DEFAULT_DEFINITION);
    if path.exists() && !force {
        return Err(miette::miette!(
            "{} already exists. Use --force to overwrite.",
            DEFAULT_DEFINITION
        ));
    }

    let content = starter_definition(&id);

    // Never write a starter that would not load
    let definition = PipelineDefinition::from_yaml(&content)?;
    DefinitionValidator::validate(&definition).into_result()?;

    std::fs::write(path, &content)
        .map_err(|e| miette::miette!("Failed to write {}: {}", DEFAULT_DEFINITION, e))?;

    println!("  {} Created {}", "✓".green(), DEFAULT_DEFINITION);
    println!();
    println!("{}", "Pipeline initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to describe your stages", DEFAULT_DEFINITION.cyan());
    println!("  2. Check it with {}", "tierflow validate".cyan());
    println!(
        "  3. Run it with {}",
        "tierflow run -o output -i files=data/*.csv".cyan()
    );
    println!();

    if verbose {
        println!("{}", "Generated definition:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", content.dimmed());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_definition_is_valid() {
        let definition = PipelineDefinition::from_yaml(&starter_definition("ventas")).unwrap();

        assert_eq!(definition.id, "ventas");
        assert_eq!(definition.stage_names(), vec!["silver", "gold"]);
        assert!(DefinitionValidator::validate(&definition).is_valid());
    }
}
