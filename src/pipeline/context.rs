// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Run inputs and per-run state

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use crate::errors::{TierflowError, TierflowResult};
use crate::pipeline::{PipelineDefinition, StageResult};

/// Named inputs supplied by whoever starts a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunInputs {
    values: BTreeMap<String, Value>,
}

impl RunInputs {
    /// Create an empty set of run inputs
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an input
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style insert of a single path
    pub fn with_path(mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.insert(name, path_value(path.as_ref()));
        self
    }

    /// Builder-style insert of a path list
    pub fn with_paths<I, P>(mut self, name: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let list: Vec<Value> = paths.into_iter().map(|p| path_value(p.as_ref())).collect();
        self.insert(name, Value::Array(list));
        self
    }

    /// Builder-style insert of any value
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Paths named by an input; strings and string lists both count
    pub fn paths(&self, name: &str) -> Vec<PathBuf> {
        match self.values.get(name) {
            Some(Value::String(s)) => vec![PathBuf::from(s)],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(PathBuf::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Parse `NAME=VALUE` pairs from the command line.
    ///
    /// Values containing glob metacharacters are expanded, and relative
    /// values naming an existing path are resolved against `base_dir`.
    /// Repeating a name collects its values into a list.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S], base_dir: &Path) -> TierflowResult<Self> {
        let mut collected: BTreeMap<String, Vec<Value>> = BTreeMap::new();

        for pair in pairs {
            let pair = pair.as_ref();
            let (name, value) = pair.split_once('=').ok_or_else(|| TierflowError::InvalidRunInput {
                input: pair.to_string(),
                reason: "expected NAME=VALUE".into(),
            })?;

            let name = name.trim();
            if name.is_empty() {
                return Err(TierflowError::InvalidRunInput {
                    input: pair.to_string(),
                    reason: "input name is empty".into(),
                });
            }

            let entry = collected.entry(name.to_string()).or_default();
            if is_glob(value) {
                entry.extend(expand_glob(value, base_dir)?.iter().map(|p| path_value(p)));
            } else {
                entry.push(resolve_existing(value, base_dir));
            }
        }

        let values = collected
            .into_iter()
            .map(|(name, mut list)| {
                let value = if list.len() == 1 {
                    list.remove(0)
                } else {
                    Value::Array(list)
                };
                (name, value)
            })
            .collect();

        Ok(Self { values })
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().to_string())
}

/// Absolute path for a relative value that exists under `base_dir`
fn resolve_existing(value: &str, base_dir: &Path) -> Value {
    let candidate = Path::new(value);
    if !value.is_empty() && candidate.is_relative() && base_dir.join(candidate).exists() {
        return path_value(&base_dir.join(candidate));
    }
    Value::String(value.to_string())
}

fn is_glob(value: &str) -> bool {
    value.contains(['*', '?', '['])
}

/// Resolve a glob pattern to file paths, sorted
fn expand_glob(pattern: &str, base_dir: &Path) -> TierflowResult<Vec<PathBuf>> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base_dir.join(pattern).to_string_lossy().to_string()
    };

    let mut matches: Vec<PathBuf> = glob::glob(&full_pattern)?.filter_map(Result::ok).collect();

    if matches.is_empty() {
        return Err(TierflowError::NoInputFiles {
            pattern: pattern.to_string(),
        });
    }

    matches.sort();
    Ok(matches)
}

/// State of one run, owned by the executor driving it
#[derive(Debug)]
pub struct RunContext {
    /// Definition parsed for this run
    pub definition: PipelineDefinition,
    /// Inputs the run was started with
    pub run_inputs: RunInputs,
    /// Root that `${output_dir}` expands to
    pub output_root: PathBuf,
    /// Results of attempted stages, in execution order
    pub stage_results: Vec<StageResult>,
    /// Monotonic start time
    pub started_at: Instant,
    /// Wall-clock start time
    pub started_at_wall: SystemTime,
}

impl RunContext {
    pub fn new(definition: PipelineDefinition, run_inputs: RunInputs, output_root: PathBuf) -> Self {
        Self {
            definition,
            run_inputs,
            output_root,
            stage_results: Vec::new(),
            started_at: Instant::now(),
            started_at_wall: SystemTime::now(),
        }
    }

    /// Result of an attempted stage
    pub fn stage_result(&self, name: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| r.stage_name == name)
    }

    /// Record the result of the stage just attempted
    pub fn record(&mut self, result: StageResult) {
        self.stage_results.push(result);
    }

    pub fn total_stages(&self) -> usize {
        self.definition.stages.len()
    }
}
