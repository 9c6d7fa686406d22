//! Producer-side middleware: captures ambient context into the job payload.

use super::ContextRegistry;
use crate::context::ClassCatalog;
use crate::core::{encode_attributes, Job};
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink};
use crate::middleware::{ClientMiddleware, ClientNext, Dispatch};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Client middleware writing each registered class's attributes into the job.
///
/// A wire key that is already present is never touched: the transport may
/// push the same job again on retry, and the context captured at the first
/// push must survive.
pub struct SaveContext {
    registry: Arc<ContextRegistry>,
    catalog: Arc<ClassCatalog>,
    events: Arc<dyn EventSink>,
}

impl SaveContext {
    /// Creates the middleware.
    #[must_use]
    pub fn new(registry: Arc<ContextRegistry>, catalog: Arc<ClassCatalog>) -> Self {
        Self {
            registry,
            catalog,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Writes the ambient attributes of every registered class into `job`.
    ///
    /// Fails only when a registered class name does not resolve.
    pub fn capture(&self, job: &mut Job) -> Result<()> {
        for (key, class_name) in self.registry.iter() {
            if job.contains_key(key.as_str()) {
                debug!(key = %key, class = class_name, jid = ?job.jid(), "context already in payload, keeping it");
                self.events.emit(
                    "context.skipped",
                    Some(json!({"key": key.as_str(), "class": class_name})),
                );
                continue;
            }

            let class = self.catalog.resolve(class_name)?;
            let attributes = encode_attributes(&class.attributes());
            if attributes.is_empty() {
                debug!(key = %key, class = class_name, "no ambient attributes set");
                continue;
            }

            let names: Vec<&String> = attributes.keys().collect();
            debug!(key = %key, class = class_name, attributes = ?names, "saving ambient context");
            self.events.emit(
                "context.saved",
                Some(json!({"key": key.as_str(), "class": class_name, "attributes": names})),
            );
            job.insert(key.as_str(), Value::Object(attributes));
        }
        Ok(())
    }
}

#[async_trait]
impl ClientMiddleware for SaveContext {
    async fn call(&self, job: &mut Job, next: ClientNext<'_>) -> Result<Dispatch> {
        self.capture(job)?;
        next.run(job).await
    }
}
