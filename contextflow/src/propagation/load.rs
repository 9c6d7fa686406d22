//! Consumer-side middleware: restores ambient context around job execution.
//!
//! Every job runs in its own scope, whether or not its payload carries any
//! context. Contexts are installed one class at a time, each inside the scope
//! of the previous one, and the handler runs innermost. Leaving a scope restores what
//! the class held before, so teardown happens in reverse order on every exit
//! path, including errors, panics and cancellation.

use super::ContextRegistry;
use crate::config::PersistConfig;
use crate::context::{ambient, ClassCatalog, ContextClass};
use crate::core::{AttributeMap, AttributeValue, EntityLocator, Job, ReferenceToken};
use crate::errors::{ContextflowError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::middleware::{ServerMiddleware, ServerNext};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

type Pending<'a> = (Arc<dyn ContextClass>, &'a Map<String, Value>);

/// Server middleware installing each registered class's payload attributes.
pub struct LoadContext {
    registry: Arc<ContextRegistry>,
    catalog: Arc<ClassCatalog>,
    locator: Arc<dyn EntityLocator>,
    recover_schema_drift: bool,
    resolve_references: bool,
    events: Arc<dyn EventSink>,
}

impl LoadContext {
    /// Creates the middleware with default options.
    #[must_use]
    pub fn new(
        registry: Arc<ContextRegistry>,
        catalog: Arc<ClassCatalog>,
        locator: Arc<dyn EntityLocator>,
    ) -> Self {
        let defaults = PersistConfig::default();
        Self {
            registry,
            catalog,
            locator,
            recover_schema_drift: defaults.recover_schema_drift,
            resolve_references: defaults.resolve_references,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Applies the load options from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &PersistConfig) -> Self {
        self.recover_schema_drift = config.recover_schema_drift;
        self.resolve_references = config.resolve_references;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Collects the classes whose wire key is present, in registry order.
    fn pending<'a>(&self, job: &'a Job) -> Result<Vec<Pending<'a>>> {
        let mut pending = Vec::new();
        for (key, class_name) in self.registry.iter() {
            let Some(raw) = job.get(key.as_str()) else {
                continue;
            };
            let Value::Object(raw) = raw else {
                return Err(ContextflowError::MalformedPayload {
                    key: key.to_string(),
                    reason: format!("expected an object of attributes, found {raw}"),
                });
            };
            pending.push((self.catalog.resolve(class_name)?, raw));
        }
        Ok(pending)
    }

    /// Turns wire values back into attribute values.
    ///
    /// Strings the locator resolves become live entities; everything else,
    /// including tokens for records that are gone, is kept as-is.
    pub fn reconstruct(&self, class_name: &str, raw: &Map<String, Value>) -> AttributeMap {
        raw.iter()
            .map(|(name, value)| (name.clone(), self.reconstruct_value(class_name, name, value)))
            .collect()
    }

    fn reconstruct_value(&self, class_name: &str, name: &str, value: &Value) -> AttributeValue {
        if self.resolve_references {
            if let Value::String(text) = value {
                if let Some(entity) = self.locator.locate(text) {
                    return AttributeValue::Entity(entity);
                }
                if ReferenceToken::is_token(text) {
                    debug!(class = class_name, attribute = name, token = %text, "reference did not resolve, keeping raw value");
                    self.events.emit(
                        "context.reference_unresolved",
                        Some(json!({"class": class_name, "attribute": name, "token": text})),
                    );
                }
            }
        }
        AttributeValue::Plain(value.clone())
    }

    /// Validates the payload attributes of `class`, filtering out undeclared
    /// attributes and retrying at most once.
    pub fn install(&self, class: &dyn ContextClass, raw: &Map<String, Value>) -> Result<AttributeMap> {
        let mut values = self.reconstruct(class.name(), raw);
        let mut retried = false;

        loop {
            match class.try_set(values.clone()) {
                Ok(resolved) => return Ok(resolved),
                Err(err) if self.recover_schema_drift && !retried => {
                    let declared = class.declared_attributes();
                    values.retain(|name, _| declared.contains(name));
                    retried = true;

                    warn!(
                        class = class.name(),
                        dropped = ?err.attributes,
                        "context class no longer declares payload attributes, retrying without them"
                    );
                    self.events.emit(
                        "context.schema_drift",
                        Some(json!({"class": class.name(), "dropped": err.attributes})),
                    );
                }
                Err(err) => {
                    return Err(ContextflowError::SchemaDrift {
                        class: err.class,
                        attributes: err.attributes,
                    })
                }
            }
        }
    }

    fn wrap<'a>(
        &'a self,
        pending: &'a [Pending<'a>],
        job: &'a Job,
        next: ServerNext<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(((class, raw), rest)) = pending.split_first() else {
                return next.run(job).await;
            };

            let values = self.install(class.as_ref(), raw)?;
            debug!(class = class.name(), attributes = ?values.keys().collect::<Vec<_>>(), "installing ambient context");
            self.events.emit(
                "context.loaded",
                Some(json!({"class": class.name(), "attributes": values.keys().collect::<Vec<_>>()})),
            );

            ambient::activate(class.name(), values, self.wrap(rest, job, next)).await
        })
    }
}

#[async_trait]
impl ServerMiddleware for LoadContext {
    async fn call(&self, job: &Job, next: ServerNext<'_>) -> Result<()> {
        let pending = self.pending(job)?;
        ambient::nest(self.wrap(&pending, job, next)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CurrentAttributes;
    use crate::core::Entity;
    use crate::errors::UnknownAttributeError;
    use crate::events::CollectingEventSink;
    use crate::middleware::{handler_fn, JobHandler};
    use crate::testing::{Account, FailingHandler, FixtureWorld, RecordingHandler, SlowHandler, User};
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn load_context(world: &FixtureWorld, classes: &[&str]) -> LoadContext {
        LoadContext::new(
            Arc::new(ContextRegistry::build(classes)),
            world.catalog.clone(),
            world.locator.clone(),
        )
    }

    fn job_with(fields: Value) -> Job {
        Job::from_value(fields).unwrap()
    }

    async fn run(load: &LoadContext, job: &Job, handler: &dyn JobHandler) -> Result<()> {
        load.call(job, ServerNext::handler_only(handler)).await
    }

    #[tokio::test]
    async fn test_installs_entity_from_token() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let handler = RecordingHandler::new(&["Current"]);
        let job = job_with(json!({
            "something": "else",
            "cattr": {"account": world.account_token().as_str()}
        }));

        run(&load, &job, &handler).await.unwrap();

        let seen = handler.last_for("Current");
        assert_eq!(
            seen.get("account").and_then(AttributeValue::downcast_entity::<Account>),
            Some(world.account.as_ref())
        );
        assert!(world.current.get("account").is_none());
    }

    #[tokio::test]
    async fn test_absent_key_leaves_class_unset() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let handler = RecordingHandler::new(&["Current"]);

        run(&load, &job_with(json!({"something": "else"})), &handler).await.unwrap();

        assert_eq!(handler.call_count(), 1);
        assert!(handler.last_for("Current").is_empty());
    }

    #[tokio::test]
    async fn test_handler_writes_work_without_payload_context() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let current = world.current.clone();
        let handler = handler_fn(move |_job| {
            let current = current.clone();
            async move {
                current.set("request_id", "from-handler")?;
                anyhow::ensure!(
                    current.get("request_id") == Some(AttributeValue::plain("from-handler")),
                    "write not visible inside the handler"
                );
                Ok::<(), anyhow::Error>(())
            }
        });

        run(&load, &job_with(json!({"cattr": {"request_id": "job"}})), &handler)
            .await
            .unwrap();
        run(&load, &job_with(json!({"something": "else"})), &handler)
            .await
            .unwrap();

        ambient::scope(async {
            world.current.set("request_id", "worker").unwrap();
            run(&load, &job_with(json!({"something": "else"})), &handler)
                .await
                .unwrap();
            assert_eq!(world.current.get("request_id"), Some(AttributeValue::plain("worker")));
        })
        .await;
    }

    #[tokio::test]
    async fn test_scalars_and_entities_mixed() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let handler = RecordingHandler::new(&["Current"]);
        let job = job_with(json!({
            "cattr": {
                "account": world.account_token().as_str(),
                "request_id": 1234,
                "project": {"name": "apollo"}
            }
        }));

        run(&load, &job, &handler).await.unwrap();

        let seen = handler.last_for("Current");
        assert_eq!(seen.get("request_id"), Some(&AttributeValue::plain(1234)));
        assert_eq!(seen.get("project"), Some(&AttributeValue::plain(json!({"name": "apollo"}))));
        assert!(seen.get("account").and_then(AttributeValue::as_entity).is_some());
    }

    #[tokio::test]
    async fn test_user_setter_derives_account() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let handler = RecordingHandler::new(&["Current"]);
        let job = job_with(json!({
            "cattr": {"user": world.user_token().as_str(), "account": world.account_token().as_str()}
        }));

        run(&load, &job, &handler).await.unwrap();

        let seen = handler.last_for("Current");
        assert_eq!(
            seen.get("user").and_then(AttributeValue::downcast_entity::<User>),
            Some(world.user.as_ref())
        );
        assert_eq!(
            seen.get("account").and_then(AttributeValue::downcast_entity::<Account>),
            Some(world.account.as_ref())
        );
    }

    #[tokio::test]
    async fn test_multiple_classes_are_independent() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current", "Current2"]);
        let handler = RecordingHandler::new(&["Current", "Current2"]);
        let job = job_with(json!({
            "cattr": {"account": world.account_token().as_str()},
            "cattr_1": {"user": world.user_token().as_str()}
        }));

        run(&load, &job, &handler).await.unwrap();

        let current = handler.last_for("Current");
        let current2 = handler.last_for("Current2");
        assert_eq!(current.keys().collect::<Vec<_>>(), vec!["account"]);
        assert_eq!(current2.keys().collect::<Vec<_>>(), vec!["user"]);
        assert_eq!(
            current2.get("user").and_then(AttributeValue::downcast_entity::<User>),
            Some(world.user.as_ref())
        );
    }

    #[tokio::test]
    async fn test_only_second_class_present() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current", "Current2"]);
        let handler = RecordingHandler::new(&["Current", "Current2"]);
        let job = job_with(json!({"cattr_1": {"user": world.user_token().as_str()}}));

        run(&load, &job, &handler).await.unwrap();

        assert!(handler.last_for("Current").is_empty());
        assert_eq!(handler.last_for("Current2").len(), 1);
    }

    #[tokio::test]
    async fn test_later_class_sees_earlier_class_while_installing() {
        let world = FixtureWorld::new();
        world.catalog.define(Arc::new(
            CurrentAttributes::new("Tenant")
                .declare_all(["label", "request_echo"])
                .with_setter("label", |_, values| {
                    if let Some(request_id) = ambient::get("Current", "request_id") {
                        values.insert("request_echo".to_string(), request_id);
                    }
                }),
        ));
        let load = load_context(&world, &["Current", "Tenant"]);
        let handler = RecordingHandler::new(&["Tenant"]);
        let job = job_with(json!({"cattr": {"request_id": 9}, "cattr_1": {"label": "acme"}}));

        run(&load, &job, &handler).await.unwrap();

        assert_eq!(
            handler.last_for("Tenant").get("request_echo"),
            Some(&AttributeValue::plain(9))
        );
    }

    #[tokio::test]
    async fn test_dangling_reference_degrades_to_raw_value() {
        let world = FixtureWorld::new();
        let sink = Arc::new(CollectingEventSink::new());
        let load = load_context(&world, &["Current"]).with_event_sink(sink.clone());
        let handler = RecordingHandler::new(&["Current"]);
        let token = world.account_token();
        assert!(world.locator.remove(&token));

        let job = job_with(json!({"cattr": {"account": token.as_str()}}));
        run(&load, &job, &handler).await.unwrap();

        assert_eq!(
            handler.last_for("Current").get("account"),
            Some(&AttributeValue::plain(token.as_str()))
        );
        assert_eq!(sink.events_of_type("context.reference_unresolved").len(), 1);
    }

    #[tokio::test]
    async fn test_reference_resolution_can_be_disabled() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"])
            .with_config(&PersistConfig::new().with_reference_resolution(false));
        let handler = RecordingHandler::new(&["Current"]);
        let job = job_with(json!({"cattr": {"account": world.account_token().as_str()}}));

        run(&load, &job, &handler).await.unwrap();

        assert_eq!(
            handler.last_for("Current").get("account"),
            Some(&AttributeValue::plain(world.account_token().as_str()))
        );
    }

    mockall::mock! {
        Locator {}
        impl EntityLocator for Locator {
            fn locate(&self, token: &str) -> Option<Arc<dyn Entity>>;
        }
    }

    #[tokio::test]
    async fn test_only_strings_are_offered_to_locator() {
        let world = FixtureWorld::new();
        let account_token = world.account_token();
        let expected = account_token.as_str().to_string();

        let mut locator = MockLocator::new();
        locator
            .expect_locate()
            .withf(move |token| token.to_string() == expected)
            .times(1)
            .returning(|_| {
                Some(Arc::new(Account {
                    id: 42,
                    name: "test".to_string(),
                }) as Arc<dyn Entity>)
            });
        locator
            .expect_locate()
            .withf(|token| token.to_string() == "apollo")
            .times(1)
            .returning(|_| None);

        let load = LoadContext::new(
            Arc::new(ContextRegistry::build("Current")),
            world.catalog.clone(),
            Arc::new(locator),
        );
        let handler = RecordingHandler::new(&["Current"]);
        let job = job_with(json!({
            "cattr": {"account": account_token.as_str(), "project": "apollo", "request_id": 5}
        }));

        run(&load, &job, &handler).await.unwrap();

        let seen = handler.last_for("Current");
        assert!(seen.get("account").and_then(AttributeValue::as_entity).is_some());
        assert_eq!(seen.get("project"), Some(&AttributeValue::plain("apollo")));
    }

    #[tokio::test]
    async fn test_schema_drift_filters_unknown_attribute() {
        let world = FixtureWorld::new();
        let sink = Arc::new(CollectingEventSink::new());
        let load = load_context(&world, &["Current"]).with_event_sink(sink.clone());
        let handler = RecordingHandler::new(&["Current"]);

        run(&load, &job_with(json!({"cattr": {"ghost_attr": 1}})), &handler)
            .await
            .unwrap();

        assert_eq!(handler.call_count(), 1);
        assert!(handler.last_for("Current").is_empty());
        assert_eq!(
            sink.events_of_type("context.schema_drift"),
            vec![Some(json!({"class": "Current", "dropped": ["ghost_attr"]}))]
        );
    }

    #[tokio::test]
    async fn test_schema_drift_keeps_declared_attributes() {
        let world = FixtureWorld::new();
        world.redefine_current(CurrentAttributes::new("Current").declare("request_id"));
        let load = load_context(&world, &["Current"]);
        let handler = RecordingHandler::new(&["Current"]);
        let job = job_with(json!({
            "cattr": {"request_id": 77, "account": world.account_token().as_str()}
        }));

        run(&load, &job, &handler).await.unwrap();

        let seen = handler.last_for("Current");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.get("request_id"), Some(&AttributeValue::plain(77)));
    }

    struct StubbornClass {
        attempts: AtomicUsize,
    }

    impl ContextClass for StubbornClass {
        fn name(&self) -> &str {
            "Current"
        }

        fn declared_attributes(&self) -> Vec<String> {
            vec!["request_id".to_string()]
        }

        fn try_set(&self, values: AttributeMap) -> Result<AttributeMap, UnknownAttributeError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(UnknownAttributeError::new("Current", values.keys().cloned().collect()))
        }
    }

    #[tokio::test]
    async fn test_second_schema_failure_is_fatal() {
        let world = FixtureWorld::new();
        let stubborn = Arc::new(StubbornClass {
            attempts: AtomicUsize::new(0),
        });
        world.catalog.define(stubborn.clone());
        let load = load_context(&world, &["Current"]);
        let handler = RecordingHandler::new(&["Current"]);

        let err = run(&load, &job_with(json!({"cattr": {"request_id": 1, "ghost": 2}})), &handler)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ContextflowError::SchemaDrift { ref class, ref attributes }
                if class == "Current" && attributes == &vec!["request_id".to_string()]
        ));
        assert_eq!(stubborn.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(handler.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recovery_disabled_fails_on_first_drift() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"])
            .with_config(&PersistConfig::new().with_schema_drift_recovery(false));
        let handler = RecordingHandler::new(&["Current"]);

        let err = run(&load, &job_with(json!({"cattr": {"ghost_attr": 1}})), &handler)
            .await
            .unwrap_err();

        assert!(matches!(err, ContextflowError::SchemaDrift { .. }));
        assert_eq!(handler.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_field_is_rejected() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let handler = RecordingHandler::new(&["Current"]);

        let err = run(&load, &job_with(json!({"cattr": "account"})), &handler)
            .await
            .unwrap_err();

        assert!(matches!(err, ContextflowError::MalformedPayload { ref key, .. } if key == "cattr"));
        assert_eq!(handler.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_class_is_fatal() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current", "Removed"]);
        let handler = RecordingHandler::new(&["Current"]);
        let job = job_with(json!({"cattr": {"request_id": 1}, "cattr_1": {"x": 1}}));

        let err = run(&load, &job, &handler).await.unwrap_err();

        assert!(err.is_configuration_error());
        assert_eq!(handler.call_count(), 0);
    }

    #[tokio::test]
    async fn test_restores_prior_state_after_handler_error() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let handler = FailingHandler::new("handler failed", &["Current"]);

        ambient::scope(async {
            world.current.set("request_id", "outer").unwrap();
            let job = job_with(json!({"cattr": {"request_id": "job"}}));

            let err = run(&load, &job, &handler).await.unwrap_err();

            assert_eq!(err.to_string(), "handler failed");
            assert_eq!(
                handler.last_for("Current").get("request_id"),
                Some(&AttributeValue::plain("job"))
            );
            assert_eq!(world.current.get("request_id"), Some(AttributeValue::plain("outer")));
        })
        .await;
    }

    struct PanickingHandler;

    #[async_trait]
    impl JobHandler for PanickingHandler {
        async fn perform(&self, _job: &Job) -> anyhow::Result<()> {
            panic!("handler exploded");
        }
    }

    #[tokio::test]
    async fn test_restores_prior_state_after_panic() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current", "Current2"]);

        ambient::scope(async {
            world.current.set("request_id", "outer").unwrap();
            let job = job_with(json!({
                "cattr": {"request_id": "job"},
                "cattr_1": {"user": world.user_token().as_str()}
            }));

            let outcome = AssertUnwindSafe(run(&load, &job, &PanickingHandler))
                .catch_unwind()
                .await;

            assert!(outcome.is_err());
            assert_eq!(world.current.get("request_id"), Some(AttributeValue::plain("outer")));
            assert!(world.current2.get("user").is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn test_restores_prior_state_after_cancellation() {
        let world = FixtureWorld::new();
        let load = load_context(&world, &["Current"]);
        let handler = SlowHandler::new(Duration::from_secs(60));

        ambient::scope(async {
            world.current.set("request_id", "outer").unwrap();
            let job = job_with(json!({"cattr": {"request_id": "job"}}));

            let outcome = tokio::time::timeout(Duration::from_millis(20), run(&load, &job, &handler)).await;

            assert!(outcome.is_err());
            assert_eq!(handler.started(), 1);
            assert_eq!(world.current.get("request_id"), Some(AttributeValue::plain("outer")));
        })
        .await;
    }
}
