// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! tierflow - Staged Data-Tier Pipeline Orchestrator
//!
//! Run declarative bronze → silver → gold pipelines stage by stage.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tierflow::cli::{run::RunArgs, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tierflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Init { name, force } => tierflow::cli::init::run(name, force, cli.verbose).await,
        Commands::Run {
            definition,
            output,
            inputs,
            continue_on_error,
            stop_on_error,
            timeout,
            dry_run,
            format,
        } => {
            let args = RunArgs {
                definition,
                output,
                inputs,
                continue_on_error,
                stop_on_error,
                timeout,
                dry_run,
                format,
            };
            tierflow::cli::run::run(args, cli.verbose).await
        }
        Commands::Validate { definition } => {
            tierflow::cli::validate::run(definition, cli.verbose).await
        }
        Commands::Graph { definition, format } => {
            tierflow::cli::graph::run(definition, format, cli.verbose).await
        }
        Commands::Units => tierflow::cli::units::run(cli.verbose).await,
    }
}
