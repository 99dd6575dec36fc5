// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Definition validation
//!
//! Structural checks run while loading a definition, and run-level
//! preconditions checked before the first stage.

use std::collections::HashSet;
use std::path::Path;

use crate::errors::{TierflowError, TierflowResult};
use crate::pipeline::{
    template, DataFlowGraph, InputSource, PipelineDefinition, Precondition, RunInputs, StageSpec,
};
use crate::units::UnitRegistry;

/// Definition validator
pub struct DefinitionValidator;

impl DefinitionValidator {
    /// Validate the structure of a definition
    pub fn validate(definition: &PipelineDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();

        if definition.id.trim().is_empty() {
            result.add_error("Pipeline id is empty");
        }

        if definition.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        let mut seen_names = HashSet::new();
        for stage in &definition.stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        // Unknown or later stages referenced by inputs
        if let Err(e) = DataFlowGraph::build(definition) {
            result.add_error(&e.to_string());
        }

        for (idx, stage) in definition.stages.iter().enumerate() {
            Self::validate_stage(idx, stage, definition, &mut result);
        }

        for precondition in &definition.preconditions {
            if let Precondition::Artifact { path_template, .. } = precondition {
                Self::check_tokens("precondition", path_template, &mut result);
            }
        }

        result
    }

    fn validate_stage(idx: usize, stage: &StageSpec, definition: &PipelineDefinition, result: &mut ValidationResult) {
        if stage.name.trim().is_empty() {
            result.add_error(&format!("Stage {}: name is empty", idx + 1));
        }

        if stage.unit.trim().is_empty() {
            result.add_error(&format!("Stage '{}': unit is empty", stage.name));
        }

        let mut keys = HashSet::new();
        for output in &stage.outputs {
            let key = output.key();
            if !keys.insert(key.clone()) {
                result.add_error(&format!("Stage '{}': duplicate output key '{}'", stage.name, key));
            }
            Self::check_tokens(&stage.name, &output.path_template, result);
        }

        for (parameter, source) in &stage.inputs {
            match source {
                InputSource::Path { path } => Self::check_tokens(&stage.name, path, result),
                InputSource::FromStage { from_stage, output_key } => {
                    let declared = definition
                        .get_stage(from_stage)
                        .is_some_and(|upstream| upstream.output(output_key).is_some());

                    if !declared && definition.get_stage(from_stage).is_some() {
                        result.add_warning(&format!(
                            "Stage '{}': input '{}' reads '{}' which stage '{}' does not declare as an output. \
                             It will be looked up in the stage's return value.",
                            stage.name, parameter, output_key, from_stage
                        ));
                    }
                }
                InputSource::FromRun { .. } => {}
            }
        }

        if stage.inputs.is_empty() && idx > 0 {
            let previous = &definition.stages[idx - 1];
            if previous.outputs.is_empty() {
                result.add_warning(&format!(
                    "Stage '{}': declares no inputs and previous stage '{}' declares no outputs. \
                     It will only receive output_dir and its static parameters.",
                    stage.name, previous.name
                ));
            }
        }
    }

    fn check_tokens(owner: &str, template: &str, result: &mut ValidationResult) {
        for token in template::unknown_tokens(template) {
            result.add_warning(&format!(
                "'{}': unknown token '${{{}}}' in '{}' will be left as is",
                owner, token, template
            ));
        }
    }

    /// Check that every stage's unit is registered
    pub fn validate_units(definition: &PipelineDefinition, registry: &UnitRegistry) -> ValidationResult {
        let mut result = ValidationResult::new();

        for stage in &definition.stages {
            if !registry.contains(&stage.unit) {
                result.add_error(&format!(
                    "Stage '{}': no stage unit registered under '{}'",
                    stage.name, stage.unit
                ));
            }
        }

        result
    }

    /// Check run-level preconditions against the filesystem
    pub fn check_preconditions(
        definition: &PipelineDefinition,
        run_inputs: &RunInputs,
        output_root: &Path,
    ) -> TierflowResult<()> {
        for precondition in &definition.preconditions {
            match precondition {
                Precondition::Artifact {
                    path_template,
                    kind,
                    description,
                } => {
                    let path = template::render(path_template, output_root);
                    if !kind.matches(&path) {
                        return Err(TierflowError::missing_artifact(&path, description.as_deref()));
                    }
                }

                Precondition::RunInput { from_run, kind } => {
                    let paths = run_inputs.paths(from_run);
                    if paths.is_empty() {
                        return Err(TierflowError::Precondition {
                            reason: format!("run input '{}' was not provided", from_run),
                            help: Some(format!("Pass it with -i {}=<path>", from_run)),
                        });
                    }

                    if let Some(bad) = paths.iter().find(|p| !kind.matches(p)) {
                        return Err(TierflowError::Precondition {
                            reason: format!("run input '{}': {} not found: {}", from_run, kind, bad.display()),
                            help: None,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Result of definition validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Turn the collected errors into a single definition error
    pub fn into_result(self) -> TierflowResult<Vec<String>> {
        if self.errors.is_empty() {
            return Ok(self.warnings);
        }

        Err(TierflowError::InvalidDefinition {
            reason: self.errors.join("; "),
            help: Some("Run 'tierflow validate <definition>' for the full report".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn definition(yaml: &str) -> PipelineDefinition {
        PipelineDefinition::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = DefinitionValidator::validate(&definition("id: empty\ndisplay_name: Empty\nstages: []\n"));
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let yaml = r#"
id: p
display_name: P
stages:
  - { name: dup, unit: shell }
  - { name: dup, unit: shell }
"#;
        let result = DefinitionValidator::validate(&definition(yaml));
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_validate_forward_reference() {
        let yaml = r#"
id: p
display_name: P
stages:
  - name: gold
    unit: shell
    inputs:
      silver: { from_stage: silver, output_key: out }
  - name: silver
    unit: shell
"#;
        let result = DefinitionValidator::validate(&definition(yaml));
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("runs later")));
    }

    #[test]
    fn test_undeclared_output_key_warns() {
        let yaml = r#"
id: p
display_name: P
stages:
  - name: silver
    unit: shell
  - name: gold
    unit: shell
    inputs:
      registros: { from_stage: silver, output_key: registros }
"#;
        let result = DefinitionValidator::validate(&definition(yaml));
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("return value")));
    }

    #[test]
    fn test_positional_without_outputs_warns() {
        let yaml = r#"
id: p
display_name: P
stages:
  - { name: a, unit: shell }
  - { name: b, unit: shell }
"#;
        let result = DefinitionValidator::validate(&definition(yaml));
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("declares no inputs")));
    }

    #[test]
    fn test_unknown_token_warns() {
        let yaml = r#"
id: p
display_name: P
stages:
  - name: a
    unit: shell
    outputs:
      - path_template: "${output_dir}/${period}/out.csv"
"#;
        let result = DefinitionValidator::validate(&definition(yaml));
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("${period}")));
    }

    #[test]
    fn test_validate_units() {
        let yaml = "id: p\ndisplay_name: P\nstages:\n  - { name: a, unit: shell }\n  - { name: b, unit: nomina.gold }\n";
        let result = DefinitionValidator::validate_units(&definition(yaml), &UnitRegistry::with_builtins());

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("nomina.gold"));
    }

    #[test]
    fn test_preconditions() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
id: nomina
display_name: Nomina
preconditions:
  - path_template: "${output_dir}/licencias"
    kind: dir
    description: "Leave folder"
  - from_run: files
    kind: file
stages:
  - { name: a, unit: shell }
"#;
        let def = definition(yaml);

        let err = DefinitionValidator::check_preconditions(&def, &RunInputs::new(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("Leave folder not found"));

        std::fs::create_dir(dir.path().join("licencias")).unwrap();
        let err = DefinitionValidator::check_preconditions(&def, &RunInputs::new(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("'files' was not provided"));

        let input = dir.path().join("planilla.xlsx");
        let inputs = RunInputs::new().with_path("files", &input);
        assert!(DefinitionValidator::check_preconditions(&def, &inputs, dir.path()).is_err());

        std::fs::write(&input, b"x").unwrap();
        assert!(DefinitionValidator::check_preconditions(&def, &inputs, dir.path()).is_ok());
    }

    #[test]
    fn test_into_result() {
        let mut result = ValidationResult::new();
        result.add_warning("careful");
        assert_eq!(result.into_result().unwrap(), vec!["careful".to_string()]);

        let mut result = ValidationResult::new();
        result.add_error("broken");
        assert!(matches!(
            result.into_result(),
            Err(TierflowError::InvalidDefinition { .. })
        ));
    }
}
