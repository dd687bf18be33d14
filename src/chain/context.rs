//! Accumulated output map shared by the steps of one chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Identifiers produced by completed steps, consumed by later steps of the
/// same chain. Keys are only ever inserted or overwritten (last write wins);
/// there is deliberately no removal API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainContext {
    outputs: HashMap<String, Value>,
}

impl ChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a context from a persisted output snapshot (chain resume).
    pub fn from_outputs(outputs: HashMap<String, Value>) -> Self {
        Self { outputs }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.outputs.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.outputs.insert(key.into(), value);
    }

    /// Merge a step's produced outputs, overwriting existing keys.
    pub fn merge(&mut self, outputs: HashMap<String, Value>) {
        self.outputs.extend(outputs);
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.outputs.clone()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
