//! Typed key-value container backed by a JSON object.
//!
//! `Vars` is the unit of data exchanged between nodes: executors return a
//! `Vars` delta, and the engine merges it into the run state.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// An ordered string-keyed map of JSON values.
///
/// Iteration order is insertion order (serde_json's `preserve_order` is not
/// required: `Map` is a `BTreeMap` by default, giving a stable order either
/// way, which keeps merges deterministic).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vars(Map<String, Value>);

impl Vars {
    /// Create an empty `Vars`.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a key to any serializable value.
    pub fn set<V: Serialize>(
        &mut self,
        key: &str,
        value: V,
    ) {
        if let Ok(v) = serde_json::to_value(value) {
            self.0.insert(key.to_string(), v);
        }
    }

    /// Get a key, deserialized into the requested type.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw JSON value for a key.
    pub fn get_value(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.0.get(key)
    }

    /// Check whether a key is present.
    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.0.contains_key(key)
    }

    /// Remove a key, returning its value if it was present.
    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.0.remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Vars {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Value> for Vars {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.0)
    }
}
