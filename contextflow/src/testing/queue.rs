//! An in-memory stand-in for a durable queue.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::core::Job;
use crate::errors::Result;
use crate::middleware::{Dispatch, JobHandler, QueueConfig};

/// Stores pushed jobs as JSON text, so every job crosses a serialization
/// boundary between push and process like it would with a real transport.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    jobs: Mutex<VecDeque<String>>,
}

impl InMemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the client chain and stores the job unless a middleware dropped it.
    pub async fn push(&self, config: &QueueConfig, mut job: Job) -> Result<Dispatch> {
        let dispatch = config.push(&mut job).await?;
        if dispatch == Dispatch::Enqueue {
            self.jobs.lock().push_back(job.to_json_string()?);
        }
        Ok(dispatch)
    }

    /// Takes the oldest job.
    pub fn pop(&self) -> Result<Option<Job>> {
        let Some(text) = self.jobs.lock().pop_front() else {
            return Ok(None);
        };
        Job::from_json_str(&text).map(Some)
    }

    /// Pops one job and runs it through the server chain.
    ///
    /// Returns the job and the outcome, or `None` when the queue is empty.
    pub async fn work_one(
        &self,
        config: &QueueConfig,
        handler: &dyn JobHandler,
    ) -> Result<Option<(Job, Result<()>)>> {
        let Some(job) = self.pop()? else {
            return Ok(None);
        };
        let outcome = config.process(&job, handler).await;
        Ok(Some((job, outcome)))
    }

    /// Returns the number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Returns true if no jobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ambient;
    use crate::testing::{FixtureWorld, RecordingHandler};
    use serde_json::json;

    #[test]
    fn test_push_and_work_in_order() {
        let world = FixtureWorld::new();
        let (config, _) = world.queue("Current");
        let queue = InMemoryQueue::new();

        tokio_test::block_on(ambient::scope(async {
            world.current.set("request_id", "a").unwrap();
            queue.push(&config, Job::new("First", vec![])).await.unwrap();
            world.current.set("request_id", "b").unwrap();
            queue.push(&config, Job::new("Second", vec![])).await.unwrap();
        }));
        assert_eq!(queue.len(), 2);

        let handler = RecordingHandler::new(&["Current"]);
        let (job, outcome) = tokio_test::block_on(queue.work_one(&config, &handler))
            .unwrap()
            .unwrap();

        outcome.unwrap();
        assert_eq!(job.class_name(), Some("First"));
        assert_eq!(job.get("cattr"), Some(&json!({"request_id": "a"})));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_empty_queue_yields_nothing() {
        let queue = InMemoryQueue::new();
        let handler = RecordingHandler::new(&[]);
        let config = QueueConfig::new();

        assert!(queue.is_empty());
        assert!(tokio_test::block_on(queue.work_one(&config, &handler)).unwrap().is_none());
    }
}
