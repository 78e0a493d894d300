//! Loosely-typed harvested records
//!
//! A record is a mapping of field name to JSON value, kept sorted by field
//! name. Each source decides which fields it produces; the persistence sink
//! reconciles them with the destination's columns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single harvested record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, used by parsers to assemble a record inline
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Sets a field, replacing any previous value
    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the field as a string slice if it holds a JSON string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Returns the field as a float if it holds a JSON number
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Merges another record into this one
    ///
    /// Fields from `other` overwrite fields of the same name.
    pub fn merge(&mut self, other: Record) {
        for (field, value) in other.0 {
            self.0.insert(field, value);
        }
    }

    /// Iterates over field names in sorted order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over `(field, value)` pairs in sorted order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
