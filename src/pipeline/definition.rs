// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for pipeline definition files (YAML, JSON or TOML).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::{TierflowError, TierflowResult};

/// Pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Stable identifier
    pub id: String,

    /// Name shown to users
    #[serde(alias = "name")]
    pub display_name: String,

    /// Definition version
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Stages in execution order
    pub stages: Vec<StageSpec>,

    /// Run policy
    #[serde(default)]
    pub config: PipelineConfig,

    /// Checks that must hold before any stage runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<Precondition>,
}

fn default_version() -> String {
    "1".to_string()
}

/// Serialization format of a definition file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Json,
    Toml,
}

impl DefinitionFormat {
    /// Pick the format from a file extension; YAML when unknown
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

impl PipelineDefinition {
    /// Load a definition from a file
    pub fn from_file(path: &Path) -> TierflowResult<Self> {
        if !path.exists() {
            return Err(TierflowError::DefinitionNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TierflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content, DefinitionFormat::from_path(path))
    }

    /// Parse a definition in the given format
    pub fn parse(content: &str, format: DefinitionFormat) -> TierflowResult<Self> {
        match format {
            DefinitionFormat::Yaml => Self::from_yaml(content),
            DefinitionFormat::Json => Ok(serde_json::from_str(content)?),
            DefinitionFormat::Toml => Ok(toml::from_str(content)?),
        }
    }

    /// Parse a definition from YAML
    pub fn from_yaml(yaml: &str) -> TierflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize the definition to YAML
    pub fn to_yaml(&self) -> TierflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Position of a stage (0-based)
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    /// Get all stage names
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Run policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Abort the run at the first failing stage
    #[serde(default = "default_true")]
    pub stop_on_error: bool,

    /// Deadline for each stage, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            stage_timeout_secs: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name (must be unique within the pipeline)
    pub name: String,

    /// Stage description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Registry key of the stage unit
    #[serde(alias = "unit_location")]
    pub unit: String,

    /// Static parameters; strings may use `${output_dir}`
    #[serde(default, alias = "with", skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,

    /// Declared inputs by parameter name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputSource>,

    /// Expected output artifacts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputSpec>,
}

impl StageSpec {
    /// Stages this stage reads outputs from
    pub fn upstream_stages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .inputs
            .values()
            .filter_map(InputSource::references_stage)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Find a declared output by key
    pub fn output(&self, key: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.key() == key)
    }
}

/// Where a stage parameter comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSource {
    /// An output (or return-value field) of an earlier stage
    FromStage {
        from_stage: String,
        output_key: String,
    },

    /// A named run input
    FromRun { from_run: String },

    /// A path template under the output root
    Path { path: String },
}

impl InputSource {
    /// Check if this input references another stage
    pub fn references_stage(&self) -> Option<&str> {
        match self {
            Self::FromStage { from_stage, .. } => Some(from_stage),
            _ => None,
        }
    }
}

/// Expected output artifact of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Path, usually starting with `${output_dir}`
    pub path_template: String,

    /// Whether a missing artifact fails the stage
    #[serde(default = "default_true")]
    pub required: bool,

    /// Name later stages bind to; defaults to the file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl OutputSpec {
    /// The key later stages use to reference this output
    pub fn key(&self) -> String {
        if let Some(key) = &self.key {
            return key.clone();
        }

        Path::new(&self.path_template)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path_template.clone())
    }
}

/// What kind of filesystem entry a precondition expects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Any,
    File,
    Dir,
}

impl ArtifactKind {
    /// Check a path against the expected kind
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Self::Any => path.exists(),
            Self::File => path.is_file(),
            Self::Dir => path.is_dir(),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "path"),
            Self::File => write!(f, "file"),
            Self::Dir => write!(f, "directory"),
        }
    }
}

/// Run-level check performed before any stage runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Precondition {
    /// An artifact that must already exist
    Artifact {
        path_template: String,
        #[serde(default)]
        kind: ArtifactKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// A run input that must be given and point at existing paths
    RunInput {
        from_run: String,
        #[serde(default)]
        kind: ArtifactKind,
    },
}
