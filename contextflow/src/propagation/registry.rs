//! Wire key to context class registry.

use crate::config::DEFAULT_BASE_KEY;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The payload field holding one context class's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireKey(String);

impl WireKey {
    /// Returns the key for the class at `index`: the base key for the first
    /// class, `{base}_{index}` for the rest.
    #[must_use]
    pub fn at(base: &str, index: usize) -> Self {
        if index == 0 {
            Self(base.to_string())
        } else {
            Self(format!("{base}_{index}"))
        }
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WireKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WireKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One class name or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextClasses {
    /// A single class.
    One(String),
    /// Several classes, in registration order.
    Many(Vec<String>),
}

impl ContextClasses {
    fn into_names(self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        }
    }
}

impl From<&str> for ContextClasses {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<String> for ContextClasses {
    fn from(name: String) -> Self {
        Self::One(name)
    }
}

impl From<Vec<String>> for ContextClasses {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

impl From<Vec<&str>> for ContextClasses {
    fn from(names: Vec<&str>) -> Self {
        Self::Many(names.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for ContextClasses {
    fn from(names: &[&str]) -> Self {
        Self::Many(names.iter().map(|n| (*n).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ContextClasses {
    fn from(names: [&str; N]) -> Self {
        Self::Many(names.iter().map(|n| (*n).to_string()).collect())
    }
}

/// Ordered mapping from wire key to context class name.
///
/// Class names are resolved at use time, never here, so a registry can be
/// built before the classes are defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRegistry {
    entries: Vec<(WireKey, String)>,
}

impl ContextRegistry {
    /// Builds a registry with the default base key.
    #[must_use]
    pub fn build(classes: impl Into<ContextClasses>) -> Self {
        Self::build_with_base(classes, DEFAULT_BASE_KEY)
    }

    /// Builds a registry with a custom base key.
    #[must_use]
    pub fn build_with_base(classes: impl Into<ContextClasses>, base: &str) -> Self {
        Self::build_skipping(classes, base, |_| false)
    }

    /// Builds a registry whose keys avoid every key for which `taken` is true.
    ///
    /// Positions keep counting past skipped keys, so with `cattr` taken the
    /// classes get `cattr_1`, `cattr_2` and so on.
    #[must_use]
    pub fn build_skipping(
        classes: impl Into<ContextClasses>,
        base: &str,
        taken: impl Fn(&str) -> bool,
    ) -> Self {
        let mut index = 0;
        let entries = classes
            .into()
            .into_names()
            .into_iter()
            .map(|name| {
                let mut key = WireKey::at(base, index);
                while taken(key.as_str()) {
                    index += 1;
                    key = WireKey::at(base, index);
                }
                index += 1;
                (key, name)
            })
            .collect();
        Self { entries }
    }

    /// Iterates over `(wire key, class name)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&WireKey, &str)> {
        self.entries.iter().map(|(key, name)| (key, name.as_str()))
    }

    /// Returns the class registered under `key`.
    #[must_use]
    pub fn class_name(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, name)| name.as_str())
    }

    /// Returns every wire key in order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// Returns the number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no class is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
