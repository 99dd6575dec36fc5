// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! # tierflow - Staged Data-Tier Pipeline Orchestrator
//!
//! `tierflow` runs declaratively defined pipelines whose stages move data
//! through tiers (bronze → silver → gold), one stage after another.
//!
//! ## Features
//!
//! - **Declarative definitions** - YAML, JSON or TOML, one file per pipeline
//! - **Swappable stage units** - registered by key, built-in `shell` unit included
//! - **Data-flow inputs** - stages read earlier stages' outputs by key
//! - **Output contracts** - required artifacts are checked after every stage
//! - **Run events** - log lines, progress and stage boundaries over a channel
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter definition
//! tierflow init payroll
//!
//! # Check it
//! tierflow validate payroll.yaml
//!
//! # Run it
//! tierflow run payroll.yaml -o out -i files=data/*.xlsx
//! ```
//!
//! ## Embedding
//!
//! ```no_run
//! use serde_json::json;
//! use tierflow::pipeline::{events, PipelineExecutor, RunInputs};
//! use tierflow::units::{report_fn, UnitRegistry};
//!
//! # async fn demo() {
//! let mut registry = UnitRegistry::with_builtins();
//! registry.register("payroll.silver", report_fn("payroll to silver", |_params| {
//!     json!({"success": true, "rows": 120})
//! }));
//!
//! let (tx, mut rx) = events::channel();
//! let executor = PipelineExecutor::new("payroll.yaml", RunInputs::new(), "out")
//!     .with_registry(registry)
//!     .with_events(tx);
//!
//! let run = tokio::spawn(async move { executor.execute().await });
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! let result = run.await.unwrap();
//! println!("completed {}/{}", result.completed_stages, result.total_stages);
//! # }
//! ```

pub mod cli;
pub mod errors;
pub mod pipeline;
pub mod units;
pub mod utils;

// Re-export commonly used types
pub use errors::{TierflowError, TierflowResult};
pub use pipeline::{PipelineDefinition, PipelineExecutor, RunInputs, RunResult, StageSpec};
pub use units::{StageOutcome, StageUnit, UnitRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
