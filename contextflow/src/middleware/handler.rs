//! Job handlers: the body a server chain wraps.

use crate::core::Job;
use async_trait::async_trait;
use std::future::Future;

/// The body of a job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Performs the job.
    async fn perform(&self, job: &Job) -> anyhow::Result<()>;
}

/// A handler backed by a closure. Built with [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Wraps a closure taking an owned job as a [`JobHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn perform(&self, job: &Job) -> anyhow::Result<()> {
        (self.f)(job.clone()).await
    }
}
