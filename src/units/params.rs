// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Bound stage parameters

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{kinds, StageError};

/// Parameter name every stage receives: the run's output root
pub const OUTPUT_DIR: &str = "output_dir";

/// Named parameters handed to a stage unit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StageParams {
    values: BTreeMap<String, Value>,
}

impl StageParams {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Parameter names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// String parameter
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Path parameter (stored as a string)
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.str(name).map(PathBuf::from)
    }

    /// Path list parameter; a single string counts as a one-element list
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

    /// The run's output root
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.path(OUTPUT_DIR)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, StageError> {
        self.str(name).ok_or_else(|| missing(name))
    }

    pub fn require_path(&self, name: &str) -> Result<PathBuf, StageError> {
        self.path(name).ok_or_else(|| missing(name))
    }

    /// Path list that must contain at least one entry
    pub fn require_paths(&self, name: &str) -> Result<Vec<PathBuf>, StageError> {
        let paths = self.paths(name);
        if paths.is_empty() {
            return Err(missing(name));
        }
        Ok(paths)
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl From<BTreeMap<String, Value>> for StageParams {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

fn missing(name: &str) -> StageError {
    StageError::raised(
        kinds::MISSING_PARAMETER,
        format!("missing parameter '{}'", name),
    )
}
