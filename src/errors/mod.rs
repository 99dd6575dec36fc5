// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Error types
//!
//! Library-level failures that prevent a run from starting (unreadable or
//! malformed definitions, failed preconditions, unknown units). Failures of
//! individual stages are not errors at this level: they are classified into
//! [`StageStatus`](crate::pipeline::StageStatus) and folded into the run result.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for tierflow operations
pub type TierflowResult<T> = Result<T, TierflowError>;

/// Main error type for tierflow
#[derive(Error, Debug, Diagnostic)]
pub enum TierflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Definition Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline definition not found: {path}")]
    #[diagnostic(
        code(tierflow::definition_not_found),
        help("Create a definition with 'tierflow init' or write one by hand")
    )]
    DefinitionNotFound { path: PathBuf },

    #[error("Invalid pipeline definition: {reason}")]
    #[diagnostic(code(tierflow::invalid_definition))]
    InvalidDefinition {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' reads from unknown stage '{dependency}'")]
    #[diagnostic(
        code(tierflow::unknown_dependency),
        help("Check that '{dependency}' is defined in your pipeline")
    )]
    UnknownDependency { stage: String, dependency: String },

    #[error("Stage '{stage}' reads from '{dependency}', which runs later")]
    #[diagnostic(
        code(tierflow::forward_reference),
        help("Stages run in the order they are listed; move '{dependency}' before '{stage}'")
    )]
    ForwardReference { stage: String, dependency: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Run Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Precondition failed: {reason}")]
    #[diagnostic(code(tierflow::precondition_failed))]
    Precondition {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("No stage unit registered under '{unit}'")]
    #[diagnostic(
        code(tierflow::unit_not_found),
        help("Registered units: {available}")
    )]
    UnitNotFound { unit: String, available: String },

    #[error("Cannot bind parameter '{parameter}' of stage '{stage}': {reason}")]
    #[diagnostic(code(tierflow::binding_failed))]
    Binding {
        stage: String,
        parameter: String,
        reason: String,
    },

    #[error("Invalid run input '{input}': {reason}")]
    #[diagnostic(
        code(tierflow::invalid_run_input),
        help("Run inputs are given as NAME=VALUE, e.g. -i files=data/*.xlsx")
    )]
    InvalidRunInput { input: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(tierflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(tierflow::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("No files matched pattern: {pattern}")]
    #[diagnostic(
        code(tierflow::no_input_files),
        help("Check that files matching '{pattern}' exist")
    )]
    NoInputFiles { pattern: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(tierflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(tierflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(tierflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(tierflow::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(tierflow::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for TierflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for TierflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for TierflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for TierflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for TierflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl TierflowError {
    /// Create a unit-not-found error listing what is available
    pub fn unit_not_found(unit: &str, available: &[&str]) -> Self {
        let available = if available.is_empty() {
            "(none)".to_string()
        } else {
            available.join(", ")
        };

        Self::UnitNotFound {
            unit: unit.to_string(),
            available,
        }
    }

    /// Create a precondition error for a missing artifact
    pub fn missing_artifact(path: &std::path::Path, description: Option<&str>) -> Self {
        let reason = match description {
            Some(desc) => format!("{} not found: {}", desc, path.display()),
            None => format!("required artifact not found: {}", path.display()),
        };

        Self::Precondition {
            reason,
            help: Some("Place the artifact under the output root before starting the run".into()),
        }
    }

    /// True for errors raised while loading or parsing a definition
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::DefinitionNotFound { .. }
                | Self::InvalidDefinition { .. }
                | Self::UnknownDependency { .. }
                | Self::ForwardReference { .. }
                | Self::FileReadError { .. }
                | Self::Yaml { .. }
                | Self::Json { .. }
                | Self::Toml { .. }
        )
    }
}
