// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from failed runs.

use crate::pipeline::ErrorDetail;
use crate::units::kinds;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Pick a suggestion for a failed stage, if one applies
    pub fn for_failure(detail: &ErrorDetail) -> Option<Self> {
        match detail.exception_type.as_deref() {
            Some(kinds::UNIT_NOT_FOUND) => Some(Self::register_unit(&detail.unit_location)),
            Some(kinds::OUTPUT_CONTRACT) => Some(Self::fix_output_contract(&detail.stage_name)),
            Some(kinds::BINDING) => Some(Self::fix_binding(&detail.stage_name)),
            Some(kinds::TIMEOUT) => Some(Self::raise_timeout(&detail.stage_name)),
            Some(kinds::EXIT_STATUS) => Some(Self::inspect_script(&detail.stage_name)),
            _ => None,
        }
    }

    /// Suggest registering a missing stage unit
    pub fn register_unit(unit: &str) -> Self {
        Self {
            action: format!("Register a stage unit named '{}'", unit),
            steps: vec![
                "Stage units are looked up in the unit registry by key".into(),
                "Either register the unit at startup or use a built-in one".into(),
            ],
            commands: vec![
                "# List registered units:".into(),
                "tierflow units".into(),
            ],
        }
    }

    /// Suggest fixing a stage that did not produce its declared outputs
    pub fn fix_output_contract(stage: &str) -> Self {
        Self {
            action: format!("Check the outputs of stage '{}'", stage),
            steps: vec![
                "The stage returned normally but a required output is missing".into(),
                "Compare the stage's outputs[].path_template with what the unit writes".into(),
                "Mark the output `required: false` if it is genuinely optional".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest fixing an unresolvable stage input
    pub fn fix_binding(stage: &str) -> Self {
        Self {
            action: format!("Fix the inputs of stage '{}'", stage),
            steps: vec![
                "A from_stage input must name an earlier stage that succeeded".into(),
                "A from_run input must match a run input passed with -i NAME=VALUE".into(),
            ],
            commands: vec![
                "# Show the data flow between stages:".into(),
                "tierflow graph <definition>".into(),
            ],
        }
    }

    /// Suggest raising the stage timeout
    pub fn raise_timeout(stage: &str) -> Self {
        Self {
            action: format!("Stage '{}' exceeded its deadline", stage),
            steps: vec![
                "Raise config.stage_timeout_secs in the definition".into(),
                "Or override it for one run with --timeout".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest inspecting an external script
    pub fn inspect_script(stage: &str) -> Self {
        Self {
            action: format!("Inspect the script behind stage '{}'", stage),
            steps: vec![
                "The command exited with a non-zero status".into(),
                "Re-run with --verbose to see the full trace excerpt".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest fixing a failed precondition
    pub fn fix_precondition() -> Self {
        Self {
            action: "Prepare the output root before running".into(),
            steps: vec![
                "A run-level precondition failed before any stage ran".into(),
                "Check the definition's preconditions and the -o/-i arguments".into(),
            ],
            commands: vec![
                "# Check the definition:".into(),
                "tierflow validate <definition>".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
