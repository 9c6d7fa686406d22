//! Reference tokens and the entity locator seam.
//!
//! An [`Entity`] is any value that can stand in for a live domain record by
//! producing a [`ReferenceToken`]. An [`EntityLocator`] turns tokens back into
//! live entities, or reports that the record is gone.

use crate::errors::{ContextflowError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, LazyLock};

static TOKEN_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^gid://(?P<app>[^/\s]+)/(?P<model>[^/\s]+)/(?P<id>[^\s]+)$").ok()
});

/// A capability for values that represent a live domain record.
pub trait Entity: Send + Sync + fmt::Debug {
    /// Returns the portable token for this entity.
    fn to_reference(&self) -> ReferenceToken;

    /// Returns self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Resolves reference tokens back into live entities.
pub trait EntityLocator: Send + Sync {
    /// Locates the entity for `token`.
    ///
    /// Returns `None` when the text is not a token this locator understands
    /// or when the record no longer exists.
    fn locate(&self, token: &str) -> Option<Arc<dyn Entity>>;
}

/// A globally resolvable locator string, `gid://{app}/{model}/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceToken(String);

impl ReferenceToken {
    /// Builds a token from its parts.
    #[must_use]
    pub fn new(app: &str, model: &str, id: impl fmt::Display) -> Self {
        Self(format!("gid://{app}/{model}/{id}"))
    }

    /// Parses and validates token text.
    pub fn parse(text: &str) -> Result<Self> {
        if Self::is_token(text) {
            Ok(Self(text.to_string()))
        } else {
            Err(ContextflowError::InvalidReference(text.to_string()))
        }
    }

    /// Returns true if `text` has the shape of a reference token.
    #[must_use]
    pub fn is_token(text: &str) -> bool {
        TOKEN_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(text))
    }

    /// Returns the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns the application segment.
    #[must_use]
    pub fn app(&self) -> Option<&str> {
        self.segment("app")
    }

    /// Returns the model segment.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.segment("model")
    }

    /// Returns the record id segment.
    #[must_use]
    pub fn model_id(&self) -> Option<&str> {
        self.segment("id")
    }

    fn segment(&self, name: &str) -> Option<&str> {
        TOKEN_PATTERN
            .as_ref()?
            .captures(&self.0)
            .and_then(|caps| caps.name(name))
            .map(|m| m.as_str())
    }

    /// Encodes the token as URL-safe base64, for use in query strings.
    #[must_use]
    pub fn to_param(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Decodes a token produced by [`ReferenceToken::to_param`].
    pub fn from_param(param: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(param)
            .map_err(|err| ContextflowError::InvalidReference(format!("{param}: {err}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|err| ContextflowError::InvalidReference(format!("{param}: {err}")))?;
        Self::parse(&text)
    }
}

impl fmt::Display for ReferenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ReferenceToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A directory of live entities keyed by token.
#[derive(Debug, Default)]
pub struct InMemoryLocator {
    entries: DashMap<String, Arc<dyn Entity>>,
}

impl InMemoryLocator {
    /// Creates an empty locator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity and returns its token.
    pub fn register(&self, entity: Arc<dyn Entity>) -> ReferenceToken {
        let token = entity.to_reference();
        self.entries.insert(token.as_str().to_string(), entity);
        token
    }

    /// Removes an entity, simulating a deleted record.
    pub fn remove(&self, token: &ReferenceToken) -> bool {
        self.entries.remove(token.as_str()).is_some()
    }

    /// Returns the number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entities are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntityLocator for InMemoryLocator {
    fn locate(&self, token: &str) -> Option<Arc<dyn Entity>> {
        if !ReferenceToken::is_token(token) {
            return None;
        }
        self.entries.get(token).map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Widget(u64);

    impl Entity for Widget {
        fn to_reference(&self) -> ReferenceToken {
            ReferenceToken::new("shop", "Widget", self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_token_pattern_compiles() {
        assert!(TOKEN_PATTERN.is_some());
        assert!(ReferenceToken::is_token("gid://app/Account/42"));
        assert!(!ReferenceToken::is_token("gid://app/Account"));
        assert!(!ReferenceToken::is_token("gid://app/Account/4 2"));
    }

    #[test]
    fn test_token_parts() {
        let token = ReferenceToken::new("shop", "Widget", 42);
        assert_eq!(token.as_str(), "gid://shop/Widget/42");
        assert_eq!(token.app(), Some("shop"));
        assert_eq!(token.model(), Some("Widget"));
        assert_eq!(token.model_id(), Some("42"));
    }

    #[test]
    fn test_parse_rejects_plain_strings() {
        assert!(ReferenceToken::parse("gid://shop/Widget/7").is_ok());
        assert!(matches!(
            ReferenceToken::parse("hello"),
            Err(ContextflowError::InvalidReference(_))
        ));
        assert!(!ReferenceToken::is_token("gid://shop/Widget"));
    }

    #[test]
    fn test_param_encoding() {
        let token = ReferenceToken::new("shop", "Widget", 9);
        let param = token.to_param();
        assert!(!param.contains('/'));
        assert_eq!(ReferenceToken::from_param(&param).unwrap(), token);
        assert!(ReferenceToken::from_param("%%%").is_err());
    }

    #[test]
    fn test_locator_round_trip() {
        let locator = InMemoryLocator::new();
        let token = locator.register(Arc::new(Widget(3)));

        let found = locator.locate(token.as_str()).unwrap();
        assert_eq!(found.to_reference(), token);
        assert_eq!(found.as_any().downcast_ref::<Widget>().map(|w| w.0), Some(3));
    }

    #[test]
    fn test_locator_misses() {
        let locator = InMemoryLocator::new();
        let token = locator.register(Arc::new(Widget(5)));

        assert!(locator.locate("not a token").is_none());
        assert!(locator.locate("gid://shop/Widget/6").is_none());

        assert!(locator.remove(&token));
        assert!(locator.locate(token.as_str()).is_none());
        assert!(locator.is_empty());
    }
}
