// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Pipeline definitions and execution
//!
//! A pipeline is an ordered list of stages. Each stage delegates to a
//! registered stage unit, reads its parameters from run inputs or earlier
//! stages, and promises a set of output artifacts under the run's output root.

mod binder;
mod context;
mod dag;
mod definition;
pub mod events;
mod executor;
mod result;
mod stage;
pub mod template;
mod validation;
mod verifier;

pub use binder::ParameterBinder;
pub use context::{RunContext, RunInputs};
pub use dag::{DataEdge, DataFlowGraph};
pub use definition::*;
pub use events::{EventReceiver, EventSender, LogLevel, PipelineEvent};
pub use executor::{CancelHandle, ExecutionOptions, PipelineExecutor};
pub use result::*;
pub use stage::StageExecutor;
pub use validation::{DefinitionValidator, ValidationResult};
pub use verifier::{OutputVerifier, OutputViolation, VerifiedArtifact};
