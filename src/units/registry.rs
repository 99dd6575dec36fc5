// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Stage unit registry
//!
//! Maps the `unit` key used in pipeline definitions to a concrete
//! implementation. Populated once at process start.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ShellUnit, StageUnit};
use crate::errors::{TierflowError, TierflowResult};

/// Registry of stage units by key
#[derive(Clone, Default)]
pub struct UnitRegistry {
    units: HashMap<String, Arc<dyn StageUnit>>,
}

impl UnitRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in units
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("shell", ShellUnit::new());
        registry
    }

    /// Register a unit, replacing any previous unit under the same key
    pub fn register(&mut self, key: &str, unit: impl StageUnit + 'static) {
        self.units.insert(key.to_string(), Arc::new(unit));
    }

    /// Register an already shared unit
    pub fn register_shared(&mut self, key: &str, unit: Arc<dyn StageUnit>) {
        self.units.insert(key.to_string(), unit);
    }

    /// Look a unit up by key
    pub fn resolve(&self, key: &str) -> TierflowResult<Arc<dyn StageUnit>> {
        self.units
            .get(key)
            .cloned()
            .ok_or_else(|| TierflowError::unit_not_found(key, &self.keys()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.units.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.units.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Registered units in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn StageUnit>)> {
        self.keys()
            .into_iter()
            .filter_map(move |key| self.units.get_key_value(key))
            .map(|(key, unit)| (key.as_str(), unit))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("units", &self.keys())
            .finish()
    }
}
