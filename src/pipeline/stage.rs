// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Stage execution
//!
//! Runs one stage: resolve its unit, bind parameters, run the unit, verify
//! declared outputs and classify the outcome into a [`StageResult`].

use serde_json::Value;
use std::time::{Duration, Instant};

use crate::pipeline::events::{percent_of, EventSender};
use crate::pipeline::{
    trace_excerpt, CancelHandle, ErrorDetail, OutputVerifier, ParameterBinder, RunContext, StageResult,
    StageSpec, StageStatus, VerifiedArtifact,
};
use crate::units::{adapter, kinds, normalize_report, StageError, StageOutcome, UnitRegistry};

const BANNER_WIDTH: usize = 70;

/// Invokes individual stages
pub struct StageExecutor {
    registry: UnitRegistry,
    events: EventSender,
    timeout: Option<Duration>,
    cancel: Option<CancelHandle>,
}

impl StageExecutor {
    pub fn new(registry: UnitRegistry, events: EventSender) -> Self {
        Self {
            registry,
            events,
            timeout: None,
            cancel: None,
        }
    }

    /// Fail a stage whose unit runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop a running unit when `cancel` fires
    pub fn with_cancel(mut self, cancel: Option<CancelHandle>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the stage at `stage_index` (0-based) and classify the outcome
    pub async fn invoke(&self, stage: &StageSpec, stage_index: usize, ctx: &RunContext) -> StageResult {
        let total = ctx.total_stages();
        let started = Instant::now();

        self.events
            .emit_stage_started(&stage.name, stage.description.as_deref().unwrap_or(""));
        self.events.info("=".repeat(BANNER_WIDTH));
        self.events
            .info(format!("STAGE {}/{}: {}", stage_index + 1, total, stage.name));
        if let Some(description) = &stage.description {
            self.events.info(format!("Description: {}", description));
        }
        self.events.info("=".repeat(BANNER_WIDTH));
        self.events.emit_progress(
            percent_of(stage_index, total),
            format!("Running {}...", stage.name),
        );

        let outcome = match self.run_unit(stage, stage_index, ctx).await {
            Ok(value) => {
                // Any unit may answer with a `{success, error}` report
                let raw = value.clone();
                match normalize_report(value) {
                    Ok(value) => self.verify(stage, ctx, value),
                    Err(error) => Err((error, Some(raw))),
                }
            }
            Err(error) => Err((error, None)),
        };
        let duration = started.elapsed();

        match outcome {
            Ok((value, artifacts)) => {
                self.events.info(format!(
                    "✓ Stage '{}' completed in {:.2}s",
                    stage.name,
                    duration.as_secs_f64()
                ));
                self.events.emit_stage_completed(&stage.name, true, duration);
                self.events.emit_progress(
                    percent_of(stage_index + 1, total),
                    format!("{} completed", stage.name),
                );
                StageResult::success(&stage.name, duration, value, artifacts)
            }
            Err((error, raw)) => {
                let status = if error.is_raised() {
                    StageStatus::HardFailure
                } else {
                    StageStatus::SoftFailure
                };

                let detail = ErrorDetail {
                    stage_name: stage.name.clone(),
                    stage_index: stage_index + 1,
                    total_stages: total,
                    unit_location: stage.unit.clone(),
                    exception_type: error.error_type().map(String::from),
                    message: error.message().to_string(),
                    traceback_excerpt: trace_excerpt(error.trace()),
                };

                self.events.error(format!("✗ Stage '{}' failed: {}", stage.name, error));
                for line in error.trace() {
                    self.events.debug(line.clone());
                }
                self.events.emit_stage_completed(&stage.name, false, duration);

                StageResult::failure(status, duration, raw, detail)
            }
        }
    }

    async fn run_unit(&self, stage: &StageSpec, stage_index: usize, ctx: &RunContext) -> StageOutcome {
        let unit = self
            .registry
            .resolve(&stage.unit)
            .map_err(|e| StageError::raised(kinds::UNIT_NOT_FOUND, e.to_string()))?;

        let params = ParameterBinder::bind(stage_index, stage, ctx)
            .map_err(|e| StageError::raised(kinds::BINDING, e.to_string()))?;

        tracing::debug!(stage = %stage.name, unit = %stage.unit, "running stage unit");

        let work = adapter::BlockingWork::new();
        let mut task = tokio::spawn(adapter::track_blocking(work.clone(), async move {
            unit.run(&params).await
        }));

        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cancelled = async {
            match &self.cancel {
                Some(handle) => handle.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            joined = &mut task => joined.unwrap_or_else(|e| Err(StageError::from_join_error(e))),
            _ = deadline => {
                self.stop(&mut task, &work, stage).await;
                let secs = self.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
                Err(StageError::raised(
                    kinds::TIMEOUT,
                    format!("stage '{}' did not finish within {}s", stage.name, secs),
                ))
            }
            _ = cancelled => {
                self.stop(&mut task, &work, stage).await;
                Err(StageError::raised(
                    kinds::CANCELLED,
                    format!("run cancelled while stage '{}' was running", stage.name),
                ))
            }
        }
    }

    /// Abort a running unit and wait for blocking work it started.
    ///
    /// Blocking closures cannot be interrupted, so the next stage only starts
    /// once they return.
    async fn stop(
        &self,
        task: &mut tokio::task::JoinHandle<StageOutcome>,
        work: &adapter::BlockingWork,
        stage: &StageSpec,
    ) {
        task.abort();
        let _ = task.await;

        if work.is_busy() {
            self.events
                .warning(format!("Waiting for stage unit '{}' to stop...", stage.name));
            work.wait_idle().await;
        }
    }

    /// Check declared outputs; a violation keeps the value the unit returned
    #[allow(clippy::type_complexity)]
    fn verify(
        &self,
        stage: &StageSpec,
        ctx: &RunContext,
        value: Value,
    ) -> Result<(Value, Vec<VerifiedArtifact>), (StageError, Option<Value>)> {
        match OutputVerifier::verify(stage, &ctx.output_root, &self.events) {
            Ok(artifacts) => Ok((value, artifacts)),
            Err(violation) => {
                let message = format!("output contract violation: {}", violation);
                let trace = violation
                    .missing
                    .iter()
                    .map(|p| format!("missing: {}", p.display()))
                    .collect();
                Err((
                    StageError::raised(kinds::OUTPUT_CONTRACT, message).with_trace(trace),
                    Some(value),
                ))
            }
        }
    }
}
