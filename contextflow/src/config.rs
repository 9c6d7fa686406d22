//! Configuration for context persistence.

use crate::errors::{ContextflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The wire key used for the first registered context class.
pub const DEFAULT_BASE_KEY: &str = "cattr";

/// Options shared by the save and load middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Base wire key; later classes get `{base_key}_{index}`.
    #[serde(default = "default_base_key")]
    pub base_key: String,
    /// Whether to filter undeclared attributes and retry once on load.
    #[serde(default = "default_true")]
    pub recover_schema_drift: bool,
    /// Whether to resolve reference tokens through the locator on load.
    #[serde(default = "default_true")]
    pub resolve_references: bool,
}

fn default_base_key() -> String {
    DEFAULT_BASE_KEY.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            base_key: default_base_key(),
            recover_schema_drift: default_true(),
            resolve_references: default_true(),
        }
    }
}

impl PersistConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base wire key.
    #[must_use]
    pub fn with_base_key(mut self, base_key: impl Into<String>) -> Self {
        self.base_key = base_key.into();
        self
    }

    /// Enables or disables schema-drift recovery.
    #[must_use]
    pub fn with_schema_drift_recovery(mut self, enabled: bool) -> Self {
        self.recover_schema_drift = enabled;
        self
    }

    /// Enables or disables reference resolution.
    #[must_use]
    pub fn with_reference_resolution(mut self, enabled: bool) -> Self {
        self.resolve_references = enabled;
        self
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| ContextflowError::Config(format!("invalid persist config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| ContextflowError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.base_key.trim().is_empty() {
            return Err(ContextflowError::Config("base_key must not be empty".to_string()));
        }
        Ok(())
    }
}
