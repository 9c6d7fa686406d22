//! Middleware chains for the producer (client) and consumer (server) sides.
//!
//! Each middleware receives the job and a continuation. Calling the
//! continuation runs the rest of the chain; on the server side the last link
//! is the job handler.

use super::JobHandler;
use crate::core::Job;
use crate::errors::{ContextflowError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of running the client chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Every middleware called through; the job should be enqueued.
    Enqueue,
    /// A middleware stopped the chain; the job must not be enqueued.
    Dropped,
}

/// Middleware run when a job is pushed.
#[async_trait]
pub trait ClientMiddleware: Send + Sync {
    /// Returns the middleware's priority (lower = earlier execution).
    fn priority(&self) -> i32 {
        0
    }

    /// Handles the job. Return `next.run(job)` to continue, or
    /// `Ok(Dispatch::Dropped)` to stop the push.
    async fn call(&self, job: &mut Job, next: ClientNext<'_>) -> Result<Dispatch>;
}

/// Middleware run around job execution.
#[async_trait]
pub trait ServerMiddleware: Send + Sync {
    /// Returns the middleware's priority (lower = earlier execution).
    fn priority(&self) -> i32 {
        0
    }

    /// Handles the job. Return `next.run(job)` to execute the rest of the chain.
    async fn call(&self, job: &Job, next: ServerNext<'_>) -> Result<()>;
}

/// Continuation for the client chain.
pub struct ClientNext<'a> {
    remaining: &'a [Arc<dyn ClientMiddleware>],
}

impl ClientNext<'_> {
    /// Runs the remaining middleware.
    pub async fn run(self, job: &mut Job) -> Result<Dispatch> {
        match self.remaining.split_first() {
            Some((head, rest)) => head.call(job, ClientNext { remaining: rest }).await,
            None => Ok(Dispatch::Enqueue),
        }
    }
}

/// Continuation for the server chain.
pub struct ServerNext<'a> {
    remaining: &'a [Arc<dyn ServerMiddleware>],
    handler: &'a dyn JobHandler,
}

impl<'a> ServerNext<'a> {
    /// Creates a continuation that runs only `handler`.
    #[must_use]
    pub fn handler_only(handler: &'a dyn JobHandler) -> Self {
        Self {
            remaining: &[],
            handler,
        }
    }

    /// Runs the remaining middleware and then the handler.
    pub async fn run(self, job: &Job) -> Result<()> {
        match self.remaining.split_first() {
            Some((head, rest)) => {
                head.call(
                    job,
                    ServerNext {
                        remaining: rest,
                        handler: self.handler,
                    },
                )
                .await
            }
            None => self
                .handler
                .perform(job)
                .await
                .map_err(ContextflowError::Handler),
        }
    }
}

/// An ordered chain of client middleware.
#[derive(Default)]
pub struct ClientChain {
    middleware: Vec<Arc<dyn ClientMiddleware>>,
}

impl ClientChain {
    /// Creates a new empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware to the chain. Equal priorities keep insertion order.
    pub fn add(&mut self, middleware: Arc<dyn ClientMiddleware>) {
        self.middleware.push(middleware);
        self.middleware.sort_by_key(|m| m.priority());
    }

    /// Runs the chain over `job`.
    pub async fn run(&self, job: &mut Job) -> Result<Dispatch> {
        ClientNext {
            remaining: &self.middleware,
        }
        .run(job)
        .await
    }

    /// Returns the number of middleware.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

/// An ordered chain of server middleware.
#[derive(Default)]
pub struct ServerChain {
    middleware: Vec<Arc<dyn ServerMiddleware>>,
}

impl ServerChain {
    /// Creates a new empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware to the chain. Equal priorities keep insertion order.
    pub fn add(&mut self, middleware: Arc<dyn ServerMiddleware>) {
        self.middleware.push(middleware);
        self.middleware.sort_by_key(|m| m.priority());
    }

    /// Runs the chain around `handler`.
    pub async fn run(&self, job: &Job, handler: &dyn JobHandler) -> Result<()> {
        ServerNext {
            remaining: &self.middleware,
            handler,
        }
        .run(job)
        .await
    }

    /// Returns the number of middleware.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}
