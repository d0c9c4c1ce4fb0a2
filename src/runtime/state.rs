//! The mutable record threaded through one run.
//!
//! A `State` is created fresh per run, owned exclusively by that run,
//! mutated node-by-node, and discarded when the run terminates. Reserved
//! keys: `input` (set once, never overwritten), `output` (the last node's
//! primary result), `iteration_count` (engine-managed loop counter) and
//! `error_context` (set on node failure).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::common::Vars;

/// Reserved key: the run's initial input.
pub const INPUT_KEY: &str = "input";
/// Reserved key: the last node's primary result.
pub const OUTPUT_KEY: &str = "output";
/// Reserved key: the engine-managed loop counter.
pub const ITERATION_COUNT_KEY: &str = "iteration_count";
/// Reserved key: structured description of the last node failure.
pub const ERROR_CONTEXT_KEY: &str = "error_context";

/// Run-wide key-value state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    values: Map<String, Value>,
    /// How many times each node has executed in this run.
    #[serde(skip)]
    executions: HashMap<String, u32>,
}

impl State {
    /// Create a fresh state for a run with the given input.
    pub fn new(input: &str) -> Self {
        let mut values = Map::new();
        values.insert(INPUT_KEY.to_string(), Value::String(input.to_string()));
        values.insert(ITERATION_COUNT_KEY.to_string(), Value::from(0u32));
        Self {
            values,
            executions: HashMap::new(),
        }
    }

    /// Get the raw value for a key.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a key as a string slice, if it holds a string.
    pub fn get_str(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// The run's initial input.
    pub fn input(&self) -> &str {
        self.get_str(INPUT_KEY).unwrap_or_default()
    }

    /// The last node's primary result, if any node has produced one.
    pub fn output(&self) -> Option<&Value> {
        self.get(OUTPUT_KEY)
    }

    /// The current loop counter.
    pub fn iteration_count(&self) -> u32 {
        self.get(ITERATION_COUNT_KEY).and_then(|v| v.as_u64()).unwrap_or(0) as u32
    }

    /// Merge a node's partial update into the state. Later keys overwrite
    /// same-named keys already present; writes to `input` are skipped.
    pub fn merge(
        &mut self,
        delta: Vars,
    ) {
        for (key, value) in delta.iter() {
            if key == INPUT_KEY {
                warn!("ignoring write to reserved key 'input'");
                continue;
            }
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Record a structured failure description under `error_context`.
    pub fn set_error_context(
        &mut self,
        context: Value,
    ) {
        self.values.insert(ERROR_CONTEXT_KEY.to_string(), context);
    }

    /// Record one execution of `nid` and advance `iteration_count` if this
    /// is the deepest re-entry seen so far. The counter equals the re-entry
    /// count of the most-executed node, so one full lap around a cycle
    /// costs exactly one iteration.
    pub fn record_execution(
        &mut self,
        nid: &str,
    ) {
        let count = self.executions.entry(nid.to_string()).or_insert(0);
        *count += 1;
        let reentries = *count - 1;
        if reentries > self.iteration_count() {
            self.values.insert(ITERATION_COUNT_KEY.to_string(), Value::from(reentries));
        }
    }

    /// Whether `nid` has executed at least once in this run.
    pub fn has_executed(
        &self,
        nid: &str,
    ) -> bool {
        self.executions.get(nid).copied().unwrap_or(0) > 0
    }

    /// Iterate over all state entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}
