// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Pipeline executor
//!
//! Drives one run: load and validate the definition, check preconditions,
//! then invoke every stage in listed order and fold the outcomes into a
//! [`RunResult`]. Nothing escapes `execute()`; load and precondition errors
//! become a failed result with no stage results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::errors::{TierflowError, TierflowResult};
use crate::pipeline::events::EventSender;
use crate::pipeline::{
    DefinitionValidator, ErrorDetail, PipelineDefinition, RunContext, RunInputs, RunResult, StageExecutor,
};
use crate::units::UnitRegistry;

const BANNER_WIDTH: usize = 70;

/// Pipeline execution options
///
/// `None` fields fall back to the definition's `config` block.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Only show what would be done
    pub dry_run: bool,
    /// Override `config.stop_on_error`
    pub stop_on_error: Option<bool>,
    /// Override `config.stage_timeout_secs`
    pub stage_timeout: Option<Duration>,
}

/// Cooperative cancellation for a run
///
/// Checked before each stage and raced against the running unit.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation; later calls have no effect
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set
        let _ = rx.wait_for(|flag| *flag).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Loading,
    Validating,
    Running(usize),
    Succeeded,
    Failed,
}

/// Pipeline executor
pub struct PipelineExecutor {
    definition_path: PathBuf,
    run_inputs: RunInputs,
    output_root: PathBuf,
    registry: UnitRegistry,
    events: EventSender,
    options: ExecutionOptions,
    cancel: Option<CancelHandle>,
}

impl PipelineExecutor {
    /// Create an executor for one run of the definition at `definition_path`
    pub fn new(definition_path: impl Into<PathBuf>, run_inputs: RunInputs, output_root: impl Into<PathBuf>) -> Self {
        Self {
            definition_path: definition_path.into(),
            run_inputs,
            output_root: output_root.into(),
            registry: UnitRegistry::with_builtins(),
            events: EventSender::default(),
            options: ExecutionOptions::default(),
            cancel: None,
        }
    }

    /// Use a specific unit registry
    pub fn with_registry(mut self, registry: UnitRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Send events to a host channel
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn definition_path(&self) -> &Path {
        &self.definition_path
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
    }

    fn transition(&self, state: RunState) {
        tracing::debug!(state = ?state, definition = %self.definition_path.display(), "run state");
    }

    /// Execute the run
    pub async fn execute(&self) -> RunResult {
        let started = Instant::now();

        self.transition(RunState::Loading);
        let definition = match PipelineDefinition::from_file(&self.definition_path) {
            Ok(def) => def,
            Err(e) => {
                self.transition(RunState::Failed);
                self.events
                    .error(format!("Could not load pipeline definition: {}", e));
                return RunResult::aborted(None, 0, started.elapsed(), e.to_string());
            }
        };

        let pipeline_id = Some(definition.id.clone());
        let total = definition.stages.len();

        self.transition(RunState::Validating);
        match DefinitionValidator::validate(&definition).into_result() {
            Ok(warnings) => warnings.into_iter().for_each(|w| self.events.warning(w)),
            Err(e) => {
                self.transition(RunState::Failed);
                self.events.error(e.to_string());
                return RunResult::aborted(pipeline_id, total, started.elapsed(), e.to_string());
            }
        }

        if let Err(e) = self.prepare(&definition) {
            self.transition(RunState::Failed);
            self.events.error(e.to_string());
            return RunResult::aborted(pipeline_id, total, started.elapsed(), e.to_string());
        }

        self.print_header(&definition);

        if self.options.dry_run {
            self.print_plan(&definition);
            self.transition(RunState::Succeeded);
            return RunResult {
                pipeline_id,
                success: true,
                completed_stages: 0,
                total_stages: total,
                duration: started.elapsed(),
                stage_results: Vec::new(),
                error: None,
                error_detail: None,
                failed_stages: Vec::new(),
            };
        }

        let stop_on_error = self
            .options
            .stop_on_error
            .unwrap_or(definition.config.stop_on_error);
        let timeout = self.options.stage_timeout.or(definition.config.stage_timeout());

        let stage_executor = StageExecutor::new(self.registry.clone(), self.events.clone())
            .with_timeout(timeout)
            .with_cancel(self.cancel.clone());

        let mut ctx = RunContext::new(definition, self.run_inputs.clone(), self.output_root.clone());
        let mut failed_stages: Vec<ErrorDetail> = Vec::new();
        let mut cancelled = false;

        for idx in 0..total {
            if self.cancel_requested() {
                self.events.warning(format!(
                    "Run cancelled before stage {}/{}: {}",
                    idx + 1,
                    total,
                    ctx.definition.stages[idx].name
                ));
                cancelled = true;
                break;
            }

            self.transition(RunState::Running(idx));
            let result = stage_executor
                .invoke(&ctx.definition.stages[idx], idx, &ctx)
                .await;

            let succeeded = result.is_success();
            if let Some(detail) = &result.error_detail {
                failed_stages.push(detail.clone());
            }
            ctx.record(result);

            // A successful stage finishing as the handle fires is caught above
            if !succeeded && self.cancel_requested() {
                cancelled = true;
                break;
            }

            if !succeeded && stop_on_error {
                self.events.error(format!(
                    "Stopping: stage '{}' failed and stop_on_error is set",
                    ctx.definition.stages[idx].name
                ));
                break;
            }
        }

        let completed_stages = ctx.stage_results.iter().filter(|r| r.is_success()).count();
        let success = failed_stages.is_empty() && !cancelled;

        let error = if cancelled {
            Some("Run cancelled".to_string())
        } else if failed_stages.is_empty() {
            None
        } else if stop_on_error {
            Some(format!("Error in stage: {}", failed_stages[0].stage_name))
        } else {
            let names: Vec<&str> = failed_stages.iter().map(|d| d.stage_name.as_str()).collect();
            Some(format!(
                "{} of {} stages failed: {}",
                failed_stages.len(),
                total,
                names.join(", ")
            ))
        };

        let duration = started.elapsed();
        self.events.info("=".repeat(BANNER_WIDTH));
        match &error {
            None => {
                self.transition(RunState::Succeeded);
                self.events.info(format!(
                    "✓ PIPELINE COMPLETED: {}/{} stages in {:.2}s",
                    completed_stages,
                    total,
                    duration.as_secs_f64()
                ));
                self.events.emit_progress(100, "Pipeline completed");
            }
            Some(message) => {
                self.transition(RunState::Failed);
                self.events.error(format!(
                    "✗ PIPELINE FAILED: {} ({}/{} stages succeeded)",
                    message, completed_stages, total
                ));
            }
        }
        self.events.info("=".repeat(BANNER_WIDTH));

        RunResult {
            pipeline_id,
            success,
            completed_stages,
            total_stages: total,
            duration,
            stage_results: ctx.stage_results,
            error,
            error_detail: failed_stages.first().cloned(),
            failed_stages,
        }
    }

    /// Make sure the output root is usable and preconditions hold
    fn prepare(&self, definition: &PipelineDefinition) -> TierflowResult<()> {
        if self.output_root.exists() {
            if !self.output_root.is_dir() {
                return Err(TierflowError::Precondition {
                    reason: format!("output root is not a directory: {}", self.output_root.display()),
                    help: Some("Pass a directory with -o/--output".into()),
                });
            }
        } else {
            std::fs::create_dir_all(&self.output_root).map_err(|e| TierflowError::FileWriteError {
                path: self.output_root.clone(),
                error: e.to_string(),
            })?;
        }

        DefinitionValidator::check_preconditions(definition, &self.run_inputs, &self.output_root)
    }

    fn print_header(&self, definition: &PipelineDefinition) {
        self.events.info("=".repeat(BANNER_WIDTH));
        self.events.info(format!(
            "PIPELINE: {} (v{})",
            definition.display_name, definition.version
        ));
        self.events.info(format!("Stages: {}", definition.stages.len()));
        self.events
            .info(format!("Output root: {}", self.output_root.display()));
        self.events.info("=".repeat(BANNER_WIDTH));
    }

    fn print_plan(&self, definition: &PipelineDefinition) {
        self.events.info("Execution plan (dry run):");
        for (i, stage) in definition.stages.iter().enumerate() {
            self.events
                .info(format!("  {}. {} → {}", i + 1, stage.name, stage.unit));
        }
    }
}
