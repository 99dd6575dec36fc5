// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Parameter binding
//!
//! Builds the concrete parameter set for a stage. Every stage receives
//! `output_dir`; static `with` parameters come next and declared `inputs`
//! override both. A stage that declares no inputs falls back to the
//! positional convention: the first stage gets all run inputs, every later
//! stage gets the previous stage's declared outputs.

use serde_json::Value;

use crate::errors::{TierflowError, TierflowResult};
use crate::pipeline::{template, InputSource, RunContext, StageSpec};
use crate::units::{StageParams, OUTPUT_DIR};

/// Resolves stage parameters against a run's state
pub struct ParameterBinder;

impl ParameterBinder {
    /// Bind the parameters of the stage at `stage_index` (0-based)
    pub fn bind(stage_index: usize, stage: &StageSpec, ctx: &RunContext) -> TierflowResult<StageParams> {
        let mut params = StageParams::new();
        params.insert(OUTPUT_DIR, path_string(&ctx.output_root));

        for (name, value) in &stage.params {
            params.insert(name.clone(), render_value(value, ctx));
        }

        if stage.inputs.is_empty() {
            Self::bind_positional(stage_index, ctx, &mut params);
        } else {
            for (name, source) in &stage.inputs {
                let value = Self::resolve(stage, name, source, ctx)?;
                params.insert(name.clone(), value);
            }
        }

        tracing::debug!(stage = %stage.name, params = ?params.names(), "bound parameters");
        Ok(params)
    }

    fn bind_positional(stage_index: usize, ctx: &RunContext, params: &mut StageParams) {
        if stage_index == 0 {
            for (name, value) in ctx.run_inputs.iter() {
                params.insert(name.clone(), value.clone());
            }
            return;
        }

        let Some(previous) = ctx.definition.stages.get(stage_index - 1) else {
            return;
        };

        for output in &previous.outputs {
            let path = template::render(&output.path_template, &ctx.output_root);
            params.insert(output.key(), path_string(&path));
        }
    }

    fn resolve(stage: &StageSpec, parameter: &str, source: &InputSource, ctx: &RunContext) -> TierflowResult<Value> {
        let binding_error = |reason: String| TierflowError::Binding {
            stage: stage.name.clone(),
            parameter: parameter.to_string(),
            reason,
        };

        match source {
            InputSource::FromRun { from_run } => ctx
                .run_inputs
                .get(from_run)
                .cloned()
                .ok_or_else(|| binding_error(format!("run input '{}' was not provided", from_run))),

            InputSource::Path { path } => Ok(Value::String(template::render_str(path, &ctx.output_root))),

            InputSource::FromStage { from_stage, output_key } => {
                let upstream = ctx
                    .stage_result(from_stage)
                    .ok_or_else(|| binding_error(format!("stage '{}' has not run", from_stage)))?;

                if !upstream.is_success() {
                    return Err(binding_error(format!(
                        "stage '{}' did not succeed ({})",
                        from_stage, upstream.status
                    )));
                }

                if let Some(artifact) = upstream.artifact(output_key) {
                    return Ok(Value::String(path_string(&artifact.path)));
                }

                // Declared but optional and not generated
                if let Some(output) = ctx
                    .definition
                    .get_stage(from_stage)
                    .and_then(|spec| spec.output(output_key))
                {
                    let path = template::render(&output.path_template, &ctx.output_root);
                    return Err(binding_error(format!(
                        "output '{}' of stage '{}' was not generated ({})",
                        output_key,
                        from_stage,
                        path.display()
                    )));
                }

                upstream
                    .raw_return_value
                    .as_ref()
                    .and_then(|v| v.get(output_key))
                    .cloned()
                    .ok_or_else(|| {
                        binding_error(format!(
                            "stage '{}' has no output or return field named '{}'",
                            from_stage, output_key
                        ))
                    })
            }
        }
    }
}

/// Render `${output_dir}` inside string values, recursing into lists and maps
fn render_value(value: &Value, ctx: &RunContext) -> Value {
    match value {
        Value::String(s) => Value::String(template::render_str(s, &ctx.output_root)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn path_string(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}
