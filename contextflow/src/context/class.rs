//! Context classes: named attribute schemas backed by the ambient store.

use super::ambient;
use crate::core::{AttributeMap, AttributeValue};
use crate::errors::{Result, UnknownAttributeError};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A named bag of ambient attributes whose schema is read at use time.
pub trait ContextClass: Send + Sync {
    /// Returns the class name.
    fn name(&self) -> &str;

    /// Returns the attributes this class declares right now.
    fn declared_attributes(&self) -> Vec<String>;

    /// Validates `values` against the schema and runs setter hooks.
    ///
    /// Returns the full set of values to activate, which may include
    /// attributes derived by setters.
    fn try_set(&self, values: AttributeMap) -> Result<AttributeMap, UnknownAttributeError>;

    /// Returns the attributes currently set in the ambient scope.
    fn attributes(&self) -> AttributeMap {
        ambient::attributes(self.name())
    }

    /// Returns true if the class declares `attribute`.
    fn declares(&self, attribute: &str) -> bool {
        self.declared_attributes().iter().any(|a| a == attribute)
    }
}

/// A setter hook run when an attribute is assigned.
///
/// Receives the assigned value and the values being activated, and may add
/// derived attributes to them.
pub type Setter = Arc<dyn Fn(&AttributeValue, &mut AttributeMap) + Send + Sync>;

/// The standard context class: a declared attribute list plus optional setters.
#[derive(Clone)]
pub struct CurrentAttributes {
    name: String,
    attributes: Vec<String>,
    setters: HashMap<String, Setter>,
}

impl fmt::Debug for CurrentAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentAttributes")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CurrentAttributes {
    /// Creates a class with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            setters: HashMap::new(),
        }
    }

    /// Declares an attribute.
    #[must_use]
    pub fn declare(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        if !self.attributes.contains(&attribute) {
            self.attributes.push(attribute);
        }
        self
    }

    /// Declares several attributes.
    #[must_use]
    pub fn declare_all<I, S>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        attributes
            .into_iter()
            .fold(self, |class, attribute| class.declare(attribute))
    }

    /// Registers a setter hook for `attribute`.
    #[must_use]
    pub fn with_setter<F>(mut self, attribute: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&AttributeValue, &mut AttributeMap) + Send + Sync + 'static,
    {
        self.setters.insert(attribute.into(), Arc::new(setter));
        self
    }

    /// Reads one attribute from the ambient scope.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<AttributeValue> {
        ambient::get(&self.name, attribute)
    }

    /// Assigns one attribute in the active scope, running its setter.
    pub fn set(&self, attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Result<()> {
        let mut values = AttributeMap::new();
        values.insert(attribute.into(), value.into());
        let values = self.try_set(values)?;
        ambient::set_many(&self.name, values)
    }

    /// Clears every attribute of this class in the active scope.
    pub fn reset(&self) {
        ambient::reset(&self.name);
    }

    /// Runs `fut` with `values` active for this class, restoring afterwards.
    pub async fn scoped<F: Future>(&self, values: AttributeMap, fut: F) -> Result<F::Output> {
        let values = self.try_set(values)?;
        Ok(ambient::activate(&self.name, values, fut).await)
    }
}

impl ContextClass for CurrentAttributes {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_attributes(&self) -> Vec<String> {
        self.attributes.clone()
    }

    fn try_set(&self, values: AttributeMap) -> Result<AttributeMap, UnknownAttributeError> {
        let unknown: Vec<String> = values
            .keys()
            .filter(|name| !self.attributes.contains(name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(UnknownAttributeError::new(&self.name, unknown));
        }

        let mut resolved = AttributeMap::new();
        for (name, value) in values {
            if let Some(setter) = self.setters.get(&name) {
                setter(&value, &mut resolved);
            }
            resolved.insert(name, value);
        }
        resolved.retain(|name, _| {
            let declared = self.attributes.contains(name);
            if !declared {
                debug!(class = %self.name, attribute = %name, "setter wrote an undeclared attribute, dropping it");
            }
            declared
        });
        Ok(resolved)
    }
}
