//! Wiring the save and load middleware into a queue configuration.

use super::{ContextClasses, ContextRegistry, LoadContext, SaveContext};
use crate::config::PersistConfig;
use crate::context::ClassCatalog;
use crate::core::EntityLocator;
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink};
use crate::middleware::QueueConfig;
use std::sync::Arc;
use tracing::info;

/// Persists the ambient context of `classes` across the queue boundary.
///
/// Adds [`SaveContext`] to the client chain and [`LoadContext`] to the server
/// chain of `config`, both sharing one registry, which is returned. Wire keys
/// already claimed on `config` by an earlier registration are skipped, so
/// registrations never share a payload field. Class names are not checked
/// here; an unknown name fails the first push or process that needs it.
pub fn persist(
    classes: impl Into<ContextClasses>,
    config: &mut QueueConfig,
    catalog: Arc<ClassCatalog>,
    locator: Arc<dyn EntityLocator>,
) -> Arc<ContextRegistry> {
    Persistence::new(classes, catalog, locator).register(config)
}

/// Builder form of [`persist`] with options and an event sink.
pub struct Persistence {
    classes: ContextClasses,
    catalog: Arc<ClassCatalog>,
    locator: Arc<dyn EntityLocator>,
    options: PersistConfig,
    events: Arc<dyn EventSink>,
}

impl Persistence {
    /// Starts a persistence setup for `classes`.
    #[must_use]
    pub fn new(
        classes: impl Into<ContextClasses>,
        catalog: Arc<ClassCatalog>,
        locator: Arc<dyn EntityLocator>,
    ) -> Self {
        Self {
            classes: classes.into(),
            catalog,
            locator,
            options: PersistConfig::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_config(mut self, options: PersistConfig) -> Self {
        self.options = options;
        self
    }

    /// Sets the event sink shared by both middleware.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validates the options, builds the registry and adds both middleware
    /// to `config`.
    pub fn install(self, config: &mut QueueConfig) -> Result<Arc<ContextRegistry>> {
        self.options.validate()?;
        Ok(self.register(config))
    }

    fn register(self, config: &mut QueueConfig) -> Arc<ContextRegistry> {
        let registry = Arc::new(ContextRegistry::build_skipping(
            self.classes,
            &self.options.base_key,
            |key| config.is_claimed(key),
        ));
        for key in registry.keys() {
            config.claim(key);
        }
        info!(keys = ?registry.keys(), "persisting ambient context across jobs");

        let save = SaveContext::new(registry.clone(), self.catalog.clone())
            .with_event_sink(self.events.clone());
        let load = LoadContext::new(registry.clone(), self.catalog, self.locator)
            .with_config(&self.options)
            .with_event_sink(self.events);

        config.client_middleware.add(Arc::new(save));
        config.server_middleware.add(Arc::new(load));
        registry
    }
}
