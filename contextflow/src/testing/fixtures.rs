//! Fixture entities and a seeded world for propagation tests.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::config::PersistConfig;
use crate::context::{ClassCatalog, CurrentAttributes};
use crate::core::{AttributeValue, Entity, EntityLocator, InMemoryLocator, ReferenceToken};
use crate::errors::Result;
use crate::events::EventSink;
use crate::middleware::QueueConfig;
use crate::propagation::{persist, ContextClasses, ContextRegistry, Persistence};

/// Application segment used in fixture reference tokens.
pub const FIXTURE_APP: &str = "contextflow";

/// A fixture account record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Record id.
    pub id: u64,
    /// Display name.
    pub name: String,
}

impl Entity for Account {
    fn to_reference(&self) -> ReferenceToken {
        ReferenceToken::new(FIXTURE_APP, "Account", self.id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A fixture user record belonging to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Record id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// The owning account.
    pub account: Arc<Account>,
}

impl Entity for User {
    fn to_reference(&self) -> ReferenceToken {
        ReferenceToken::new(FIXTURE_APP, "User", self.id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The `Current` fixture class: `account`, `user`, `project`, `request_id`.
///
/// Assigning `user` also assigns `account` from the user's record.
#[must_use]
pub fn current_class() -> CurrentAttributes {
    CurrentAttributes::new("Current")
        .declare_all(["account", "user", "project", "request_id"])
        .with_setter("user", |value, values| {
            if let Some(user) = value.downcast_entity::<User>() {
                values.insert("account".to_string(), AttributeValue::from(user.account.clone()));
            } else if value.is_null() {
                values.insert("account".to_string(), AttributeValue::Plain(Value::Null));
            }
        })
}

/// The `Current2` fixture class: `user`.
#[must_use]
pub fn current2_class() -> CurrentAttributes {
    CurrentAttributes::new("Current2").declare("user")
}

/// A catalog, a locator and two records wired together.
pub struct FixtureWorld {
    /// Catalog holding `Current` and `Current2`.
    pub catalog: Arc<ClassCatalog>,
    /// Locator holding `account` and `user`.
    pub locator: Arc<InMemoryLocator>,
    /// The `Current` class.
    pub current: Arc<CurrentAttributes>,
    /// The `Current2` class.
    pub current2: Arc<CurrentAttributes>,
    /// Account #42.
    pub account: Arc<Account>,
    /// User #7 of account #42.
    pub user: Arc<User>,
}

impl FixtureWorld {
    /// Builds the world.
    #[must_use]
    pub fn new() -> Self {
        let account = Arc::new(Account {
            id: 42,
            name: "test".to_string(),
        });
        let user = Arc::new(User {
            id: 7,
            name: "bob".to_string(),
            account: account.clone(),
        });

        let locator = Arc::new(InMemoryLocator::new());
        locator.register(account.clone());
        locator.register(user.clone());

        let current = Arc::new(current_class());
        let current2 = Arc::new(current2_class());
        let catalog = Arc::new(ClassCatalog::new());
        catalog.define(current.clone());
        catalog.define(current2.clone());

        Self {
            catalog,
            locator,
            current,
            current2,
            account,
            user,
        }
    }

    /// Token of the fixture account.
    #[must_use]
    pub fn account_token(&self) -> ReferenceToken {
        self.account.to_reference()
    }

    /// Token of the fixture user.
    #[must_use]
    pub fn user_token(&self) -> ReferenceToken {
        self.user.to_reference()
    }

    /// Looks a token up in the fixture locator.
    #[must_use]
    pub fn locate(&self, token: &str) -> Option<Arc<dyn Entity>> {
        self.locator.locate(token)
    }

    /// Replaces the catalog definition of `Current`, simulating a deploy that
    /// changed its schema.
    pub fn redefine_current(&self, class: CurrentAttributes) {
        self.catalog.define(Arc::new(class));
    }

    /// Builds a queue configuration with persistence installed for `classes`.
    pub fn queue(&self, classes: impl Into<ContextClasses>) -> (QueueConfig, Arc<ContextRegistry>) {
        let mut config = QueueConfig::new();
        let registry = persist(classes, &mut config, self.catalog.clone(), self.locator.clone());
        (config, registry)
    }

    /// Like [`FixtureWorld::queue`] with explicit options and event sink.
    pub fn queue_with(
        &self,
        classes: impl Into<ContextClasses>,
        options: &PersistConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<(QueueConfig, Arc<ContextRegistry>)> {
        let mut config = QueueConfig::new();
        let registry = Persistence::new(classes, self.catalog.clone(), self.locator.clone())
            .with_config(options.clone())
            .with_event_sink(events)
            .install(&mut config)?;
        Ok((config, registry))
    }
}

impl Default for FixtureWorld {
    fn default() -> Self {
        Self::new()
    }
}
