//! The job payload handed between producer and consumer.

use crate::errors::{ContextflowError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// An untyped job payload.
///
/// Contextflow only reads and writes its wire-key fields; every other field
/// belongs to the transport and the job handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Job {
    fields: Map<String, Value>,
}

impl Job {
    /// Creates a job for `class` with the given arguments.
    ///
    /// Fills `jid`, `queue` and `created_at` the way most transports do.
    #[must_use]
    pub fn new(class: impl Into<String>, args: Vec<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert("jid".to_string(), Value::String(Uuid::now_v7().simple().to_string()));
        fields.insert("class".to_string(), Value::String(class.into()));
        fields.insert("queue".to_string(), Value::String("default".to_string()));
        fields.insert("args".to_string(), Value::Array(args));
        fields.insert("created_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        Self { fields }
    }

    /// Wraps an existing field map.
    #[must_use]
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builds a job from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(ContextflowError::MalformedPayload {
                key: "<root>".to_string(),
                reason: format!("expected an object, found {other}"),
            }),
        }
    }

    /// Parses a job from its JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes the job to JSON text.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Sets the queue name.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.fields
            .insert("queue".to_string(), Value::String(queue.into()));
        self
    }

    /// Returns the job id.
    #[must_use]
    pub fn jid(&self) -> Option<&str> {
        self.fields.get("jid").and_then(Value::as_str)
    }

    /// Returns the job class name.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        self.fields.get("class").and_then(Value::as_str)
    }

    /// Returns the queue name.
    #[must_use]
    pub fn queue(&self) -> Option<&str> {
        self.fields.get("queue").and_then(Value::as_str)
    }

    /// Returns true if the payload has `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Gets a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Returns the underlying field map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the job, returning its field map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}
