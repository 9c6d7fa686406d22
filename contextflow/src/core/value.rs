//! Attribute values held by ambient context classes.

use super::reference::Entity;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Attribute name to value, ordered by name.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A single ambient attribute value.
///
/// Entities travel as their reference token; everything else travels as-is.
#[derive(Clone)]
pub enum AttributeValue {
    /// A plain JSON value.
    Plain(Value),
    /// A live domain entity.
    Entity(Arc<dyn Entity>),
}

impl AttributeValue {
    /// Wraps a plain value.
    #[must_use]
    pub fn plain(value: impl Into<Value>) -> Self {
        Self::Plain(value.into())
    }

    /// Returns the plain value, if any.
    #[must_use]
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Entity(_) => None,
        }
    }

    /// Returns the entity, if any.
    #[must_use]
    pub fn as_entity(&self) -> Option<&Arc<dyn Entity>> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Plain(_) => None,
        }
    }

    /// Downcasts an entity value to a concrete type.
    #[must_use]
    pub fn downcast_entity<E: 'static>(&self) -> Option<&E> {
        self.as_entity()
            .and_then(|entity| entity.as_any().downcast_ref::<E>())
    }

    /// Returns true if this is a JSON null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Plain(Value::Null))
    }

    /// Converts to the wire representation.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Plain(value) => value.clone(),
            Self::Entity(entity) => Value::String(entity.to_reference().into_string()),
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Plain(a), Self::Plain(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => a.to_reference() == b.to_reference(),
            _ => false,
        }
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => write!(f, "Plain({value})"),
            Self::Entity(entity) => write!(f, "Entity({})", entity.to_reference()),
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Plain(Value::String(value.to_string()))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Plain(Value::String(value))
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Plain(Value::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Plain(Value::Bool(value))
    }
}

impl<E: Entity + 'static> From<Arc<E>> for AttributeValue {
    fn from(entity: Arc<E>) -> Self {
        Self::Entity(entity)
    }
}

/// Encodes an attribute map into its wire form.
#[must_use]
pub fn encode_attributes(attributes: &AttributeMap) -> Map<String, Value> {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), value.to_wire()))
        .collect()
}
