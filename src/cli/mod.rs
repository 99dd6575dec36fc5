// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for tierflow.

pub mod graph;
pub mod init;
pub mod run;
pub mod units;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Staged data-tier pipeline orchestrator
#[derive(Parser, Debug)]
#[clap(
    name = "tierflow",
    version,
    about = "Run declarative bronze → silver → gold pipelines stage by stage",
    long_about = None,
    after_help = "Examples:\n\
        tierflow init payroll                             Write a starter definition\n\
        tierflow validate payroll.yaml                    Check a definition\n\
        tierflow run payroll.yaml -o out -i files=*.xlsx  Run a pipeline\n\
        tierflow graph payroll.yaml --format mermaid      Show the data flow\n\n\
        See 'tierflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter pipeline definition
    Init {
        /// Pipeline id (defaults to current directory name)
        name: Option<String>,

        /// Overwrite an existing definition
        #[clap(short, long)]
        force: bool,
    },

    /// Run a pipeline
    Run {
        /// Pipeline definition file
        #[clap(default_value = "pipeline.yaml")]
        definition: PathBuf,

        /// Output root that ${output_dir} expands to
        #[clap(short, long, default_value = "output", value_name = "DIR")]
        output: PathBuf,

        /// Run input as NAME=VALUE; globs are expanded, repeat to build a list
        #[clap(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Keep going after a stage fails
        #[clap(long, conflicts_with = "stop_on_error")]
        continue_on_error: bool,

        /// Stop at the first failing stage
        #[clap(long)]
        stop_on_error: bool,

        /// Per-stage deadline in seconds
        #[clap(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Dry run (show what would be done)
        #[clap(long)]
        dry_run: bool,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate a pipeline definition
    Validate {
        /// Pipeline definition file
        #[clap(default_value = "pipeline.yaml")]
        definition: PathBuf,
    },

    /// Show the pipeline's data flow as a graph
    Graph {
        /// Pipeline definition file
        #[clap(default_value = "pipeline.yaml")]
        definition: PathBuf,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// List registered stage units
    Units,
}

/// Output format for the run command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}
