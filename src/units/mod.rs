// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Stage units
//!
//! A stage unit is the swappable implementation a pipeline stage delegates to.
//! Every unit returns one sum type, [`StageOutcome`]. Collaborators that signal
//! failure some other way (a `{success: false}` report, a typed error, a panic)
//! are wrapped by the adapters in this module so the stage executor only ever
//! sees `Ok(value)` or `Err(StageError)`. The executor still classifies an
//! `Ok` report, so hand-written units may return one directly.

pub(crate) mod adapter;
mod params;
mod registry;
mod shell;

pub use adapter::{anyhow_fn, fallible_fn, normalize_report, report_fn, FnUnit};
pub use params::{StageParams, OUTPUT_DIR};
pub use registry::UnitRegistry;
pub use shell::ShellUnit;

use async_trait::async_trait;
use serde_json::Value;

/// Well-known `error_type` values produced by the orchestrator itself
pub mod kinds {
    /// The stage's unit key is not in the registry
    pub const UNIT_NOT_FOUND: &str = "UnitNotFound";
    /// A declared input could not be resolved
    pub const BINDING: &str = "BindingError";
    /// A required output was missing after the unit returned
    pub const OUTPUT_CONTRACT: &str = "OutputContractViolation";
    /// The unit exceeded the stage deadline
    pub const TIMEOUT: &str = "Timeout";
    /// The run was cancelled while the unit was running
    pub const CANCELLED: &str = "Cancelled";
    /// The unit panicked
    pub const PANIC: &str = "Panic";
    /// An external command exited with a non-zero status
    pub const EXIT_STATUS: &str = "ExitStatus";
    /// A unit asked for a parameter the binder did not supply
    pub const MISSING_PARAMETER: &str = "MissingParameter";
    /// An external command could not be started
    pub const SPAWN: &str = "SpawnError";
}

/// What a stage unit hands back to the orchestrator
pub type StageOutcome = Result<Value, StageError>;

/// Failure signalled by a stage unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// The unit failed with an error (hard failure)
    Raised {
        /// Short type name of the error, e.g. `InvalidInputError`
        error_type: String,
        /// Human-readable message
        message: String,
        /// Trace lines, outermost first
        trace: Vec<String>,
    },

    /// The unit returned normally but reported failure (soft failure)
    Reported {
        /// Message taken from the report's `error` or `message` field
        message: String,
    },
}

impl StageError {
    /// Create a raised error with no trace
    pub fn raised(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            error_type: error_type.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Create a self-reported failure
    pub fn reported(message: impl Into<String>) -> Self {
        Self::Reported {
            message: message.into(),
        }
    }

    /// Convert a typed error, keeping its short type name and source chain
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let error_type = short_type_name(std::any::type_name::<E>());
        let message = err.to_string();

        let mut trace = vec![format!("{}: {}", error_type, message)];
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(format!("Caused by: {}", cause));
            source = cause.source();
        }

        Self::Raised {
            error_type,
            message,
            trace,
        }
    }

    /// Convert an `anyhow::Error`, keeping its context chain as the trace
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = err.to_string();
        let mut trace = vec![format!("Error: {}", message)];
        trace.extend(err.chain().skip(1).map(|cause| format!("Caused by: {}", cause)));

        Self::Raised {
            error_type: "Error".to_string(),
            message,
            trace,
        }
    }

    /// Convert a failed task join (panic or abort)
    pub fn from_join_error(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "stage unit panicked".to_string()
            };

            Self::Raised {
                error_type: kinds::PANIC.to_string(),
                trace: vec![format!("panicked: {}", message)],
                message,
            }
        } else {
            Self::raised(kinds::CANCELLED, "stage unit task was cancelled")
        }
    }

    /// Replace the trace lines
    pub fn with_trace(mut self, lines: Vec<String>) -> Self {
        if let Self::Raised { trace, .. } = &mut self {
            *trace = lines;
        }
        self
    }

    /// The failure message
    pub fn message(&self) -> &str {
        match self {
            Self::Raised { message, .. } | Self::Reported { message } => message,
        }
    }

    /// The error type, absent for self-reported failures
    pub fn error_type(&self) -> Option<&str> {
        match self {
            Self::Raised { error_type, .. } => Some(error_type),
            Self::Reported { .. } => None,
        }
    }

    /// Trace lines, empty for self-reported failures
    pub fn trace(&self) -> &[String] {
        match self {
            Self::Raised { trace, .. } => trace,
            Self::Reported { .. } => &[],
        }
    }

    /// Whether this failure was raised rather than reported
    pub fn is_raised(&self) -> bool {
        matches!(self, Self::Raised { .. })
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raised {
                error_type,
                message,
                ..
            } => write!(f, "{}: {}", error_type, message),
            Self::Reported { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for StageError {}

/// Strip module paths and generics from a type name
fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Trait for stage units
#[async_trait]
pub trait StageUnit: Send + Sync {
    /// Run the unit with its bound parameters
    async fn run(&self, params: &StageParams) -> StageOutcome;

    /// One-line description shown by `tierflow units`
    fn describe(&self) -> &str {
        ""
    }

    /// Check whether the unit can run on this machine
    async fn check_available(&self) -> bool {
        true
    }
}
