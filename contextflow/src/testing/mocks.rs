//! Mock job handlers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::ambient;
use crate::core::{AttributeMap, Job};
use crate::middleware::JobHandler;

/// Ambient attributes per class name, as seen by a handler.
pub type AmbientSnapshot = HashMap<String, AttributeMap>;

fn snapshot(classes: &[String]) -> AmbientSnapshot {
    classes
        .iter()
        .map(|class| (class.clone(), ambient::attributes(class)))
        .collect()
}

/// A handler that records the ambient attributes it runs with.
#[derive(Debug)]
pub struct RecordingHandler {
    classes: Vec<String>,
    snapshots: Mutex<Vec<AmbientSnapshot>>,
}

impl RecordingHandler {
    /// Creates a handler watching `classes`.
    #[must_use]
    pub fn new(classes: &[&str]) -> Self {
        Self {
            classes: classes.iter().map(|c| (*c).to_string()).collect(),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the handler ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Returns the snapshot from the last run.
    #[must_use]
    pub fn last(&self) -> Option<AmbientSnapshot> {
        self.snapshots.lock().last().cloned()
    }

    /// Returns the attributes of `class` from the last run.
    #[must_use]
    pub fn last_for(&self, class: &str) -> AttributeMap {
        self.last()
            .and_then(|mut snapshot| snapshot.remove(class))
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn perform(&self, _job: &Job) -> anyhow::Result<()> {
        self.snapshots.lock().push(snapshot(&self.classes));
        Ok(())
    }
}

/// A handler that records the ambient attributes and then fails.
#[derive(Debug)]
pub struct FailingHandler {
    message: String,
    inner: RecordingHandler,
}

impl FailingHandler {
    /// Creates a failing handler watching `classes`.
    #[must_use]
    pub fn new(message: impl Into<String>, classes: &[&str]) -> Self {
        Self {
            message: message.into(),
            inner: RecordingHandler::new(classes),
        }
    }

    /// Returns the attributes of `class` from the last run.
    #[must_use]
    pub fn last_for(&self, class: &str) -> AttributeMap {
        self.inner.last_for(class)
    }
}

#[async_trait]
impl JobHandler for FailingHandler {
    async fn perform(&self, job: &Job) -> anyhow::Result<()> {
        self.inner.perform(job).await?;
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// A handler that sleeps, for cancellation tests.
#[derive(Debug)]
pub struct SlowHandler {
    delay: Duration,
    started: AtomicUsize,
}

impl SlowHandler {
    /// Creates a handler sleeping for `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }

    /// Returns how many runs started.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn perform(&self, _job: &Job) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
