//! Error types for contextflow.
//!
//! Configuration mistakes and unrecoverable schema drift are fatal and
//! propagate to the caller. Dangling references, empty contexts and
//! re-enqueued retries are handled silently and never show up here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T, E = ContextflowError> = std::result::Result<T, E>;

/// The main error type for contextflow operations.
#[derive(Debug, Error)]
pub enum ContextflowError {
    /// A registered context class name does not resolve in the catalog.
    #[error("Unknown context class: {name}")]
    UnknownContextClass {
        /// The class name that failed to resolve.
        name: String,
    },

    /// A write named an attribute the context class does not declare.
    #[error("{0}")]
    UnknownAttribute(#[from] UnknownAttributeError),

    /// Attributes were still rejected after the single filtering pass.
    #[error("Schema drift on {class}: rejected attributes [{}]", attributes.join(", "))]
    SchemaDrift {
        /// The context class name.
        class: String,
        /// The attributes rejected by the last attempt.
        attributes: Vec<String>,
    },

    /// An ambient attribute was written outside of any scope.
    #[error("No ambient context scope is active")]
    NoActiveScope,

    /// A wire-key field in the job payload has the wrong shape.
    #[error("Malformed payload field '{key}': {reason}")]
    MalformedPayload {
        /// The payload key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A reference token could not be parsed.
    #[error("Invalid reference token: {0}")]
    InvalidReference(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The job handler failed.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ContextflowError {
    /// Returns true for errors that indicate a setup mistake rather than a job failure.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::UnknownContextClass { .. } | Self::Config(_))
    }

    /// Returns diagnostic metadata for the fatal error kinds.
    #[must_use]
    pub fn error_info(&self) -> Option<ContractErrorInfo> {
        match self {
            Self::UnknownContextClass { name } => Some(
                ContractErrorInfo::new(
                    "CONTEXT-001-UNKNOWN_CLASS",
                    format!("Context class '{name}' is not defined in the catalog"),
                )
                .with_fix_hint("Define the class in the ClassCatalog before the first job is pushed or processed.")
                .with_context_entry("class", name.clone()),
            ),
            Self::SchemaDrift { class, attributes } => Some(
                ContractErrorInfo::new(
                    "CONTEXT-002-SCHEMA_DRIFT",
                    format!("Context class '{class}' rejected its attributes after filtering"),
                )
                .with_fix_hint("Check that declared_attributes() and try_set() agree for this class.")
                .with_context_entry("class", class.clone())
                .with_context_entry("attributes", attributes.join(",")),
            ),
            Self::MalformedPayload { key, reason } => Some(
                ContractErrorInfo::new("CONTEXT-003-MALFORMED", reason.clone())
                    .with_fix_hint("Wire-key fields must hold a JSON object of attribute values.")
                    .with_context_entry("key", key.clone()),
            ),
            Self::NoActiveScope => Some(
                ContractErrorInfo::new("CONTEXT-004-NO_SCOPE", "Ambient attributes written outside a scope")
                    .with_fix_hint("Wrap the request or job in ambient::scope before setting attributes."),
            ),
            _ => None,
        }
    }
}

/// Error raised when values name attributes a context class does not declare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class} does not declare attribute(s): {}", attributes.join(", "))]
pub struct UnknownAttributeError {
    /// The context class name.
    pub class: String,
    /// The undeclared attribute names.
    pub attributes: Vec<String>,
}

impl UnknownAttributeError {
    /// Creates a new unknown attribute error.
    #[must_use]
    pub fn new(class: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            class: class.into(),
            attributes,
        }
    }
}

/// Metadata about a fatal error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTEXT-002-SCHEMA_DRIFT").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON value, suitable for event payloads.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
