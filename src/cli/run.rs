// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Run command - execute a pipeline
//!
//! The executor runs on a spawned task while this task acts as the host:
//! it drains run events, prints log lines and drives the progress bar.

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::time::Duration;

use super::OutputFormat;
use crate::errors::RecoverySuggestion;
use crate::pipeline::{
    events, CancelHandle, EventReceiver, EventSender, ExecutionOptions, LogLevel, PipelineEvent, PipelineExecutor,
    RunInputs, RunResult, StageStatus,
};
use crate::units::UnitRegistry;
use crate::utils;

/// Arguments of the run command
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub definition: PathBuf,
    pub output: PathBuf,
    pub inputs: Vec<String>,
    pub continue_on_error: bool,
    pub stop_on_error: bool,
    pub timeout: Option<u64>,
    pub dry_run: bool,
    pub format: OutputFormat,
}

impl RunArgs {
    fn options(&self) -> ExecutionOptions {
        let stop_on_error = if self.continue_on_error {
            Some(false)
        } else if self.stop_on_error {
            Some(true)
        } else {
            None
        };

        ExecutionOptions {
            dry_run: self.dry_run,
            stop_on_error,
            stage_timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

/// Run a pipeline
pub async fn run(args: RunArgs, verbose: bool) -> Result<()> {
    let cwd = std::env::current_dir().map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;
    let run_inputs = RunInputs::parse_pairs(&args.inputs, &cwd)?;

    let cancel = CancelHandle::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    // Shell stages run inside the output root, so it must not be relative
    let output_root = cwd.join(&args.output);

    let executor = PipelineExecutor::new(&args.definition, run_inputs, output_root)
        .with_registry(UnitRegistry::with_builtins())
        .with_options(args.options())
        .with_cancel(cancel);

    let result = match args.format {
        OutputFormat::Text => {
            let (tx, rx) = events::channel();
            let executor = executor.with_events(tx);
            let run = tokio::spawn(async move { executor.execute().await });

            render_events(rx, verbose).await;
            run.await
                .map_err(|e| miette::miette!("Pipeline task failed: {}", e))?
        }
        OutputFormat::Json => {
            executor
                .with_events(EventSender::disabled())
                .execute()
                .await
        }
    };

    match args.format {
        OutputFormat::Text => print_summary(&result, verbose),
        OutputFormat::Json => {
            let json = result
                .to_json()
                .map_err(|e| miette::miette!("Failed to serialize run result: {}", e))?;
            println!("{}", json);
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(miette::miette!(
            "Pipeline run failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Print events until the executor drops its sender
async fn render_events(mut rx: EventReceiver, verbose: bool) {
    let bar = utils::create_run_progress("Starting pipeline...");

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Log { level, message } => {
                if level == LogLevel::Debug && !verbose {
                    continue;
                }
                let line = utils::format_log(level, &message);
                bar.suspend(|| println!("{}", line));
            }
            PipelineEvent::Progress { percent, message } => {
                bar.set_position(u64::from(percent));
                bar.set_message(message);
            }
            PipelineEvent::StageStarted { name, .. } => {
                bar.set_message(format!("Running {}...", name));
            }
            PipelineEvent::StageCompleted { .. } => {}
        }
    }

    bar.finish_and_clear();
}

fn print_summary(result: &RunResult, verbose: bool) {
    println!();

    if !result.stage_results.is_empty() {
        println!("{}:", "Stages".bold());
        for stage in &result.stage_results {
            let line = format!(
                "{} ({:.2}s)",
                stage.stage_name,
                stage.duration.as_secs_f64()
            );
            match stage.status {
                StageStatus::Success => utils::print_success(&line),
                StageStatus::SoftFailure => utils::print_warning(&format!("{} - {}", line, stage.status)),
                StageStatus::HardFailure => utils::print_error(&format!("{} - {}", line, stage.status)),
            }
            for artifact in &stage.artifacts {
                println!(
                    "      {} {}",
                    artifact.path.display().to_string().dimmed(),
                    format!("({:.2} MB)", artifact.size_mb()).dimmed()
                );
            }
        }
        println!();
    }

    for detail in &result.failed_stages {
        eprintln!("{}", detail.summary().red().bold());
        if verbose {
            for line in &detail.traceback_excerpt {
                eprintln!("    {}", line.dimmed());
            }
        }
        if let Some(suggestion) = RecoverySuggestion::for_failure(detail) {
            eprintln!("{}", suggestion);
        }
    }

    if result.stage_results.is_empty() && !result.success {
        if let Some(error) = &result.error {
            if error.starts_with("Precondition failed") {
                eprintln!("{}", RecoverySuggestion::fix_precondition());
            }
        }
    }

    let counts = format!(
        "{}/{} stages succeeded in {:.2}s",
        result.completed_stages,
        result.total_stages,
        result.duration.as_secs_f64()
    );

    if result.success {
        println!("{} {}", "Pipeline completed:".green().bold(), counts);
    } else {
        println!("{} {}", "Pipeline failed:".red().bold(), counts);
    }
}
