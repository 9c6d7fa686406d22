//! Catalog mapping context class names to live definitions.

use super::ContextClass;
use crate::errors::{ContextflowError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Name-to-class lookup used to resolve registered class names lazily.
///
/// Redefining a name replaces the previous class; lookups made afterwards see
/// the new schema.
#[derive(Default)]
pub struct ClassCatalog {
    classes: RwLock<HashMap<String, Arc<dyn ContextClass>>>,
}

impl ClassCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines or redefines a class under its own name.
    pub fn define(&self, class: Arc<dyn ContextClass>) {
        let name = class.name().to_string();
        self.classes.write().insert(name, class);
    }

    /// Resolves a class by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ContextClass>> {
        self.classes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContextflowError::UnknownContextClass {
                name: name.to_string(),
            })
    }

    /// Removes a class definition.
    pub fn remove(&self, name: &str) -> bool {
        self.classes.write().remove(name).is_some()
    }

    /// Returns true if `name` is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Lists defined class names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ClassCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassCatalog")
            .field("classes", &self.names())
            .finish()
    }
}
