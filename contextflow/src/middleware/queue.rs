//! Transport-side configuration holding both middleware chains.

use super::{ClientChain, Dispatch, JobHandler, ServerChain};
use crate::core::Job;
use crate::errors::Result;
use crate::observability::job_span;
use std::collections::BTreeSet;
use tracing::{debug, Instrument};

/// The middleware configuration of a queue transport.
///
/// The transport calls [`QueueConfig::push`] before persisting a job and
/// [`QueueConfig::process`] when a worker picks it up.
#[derive(Default)]
pub struct QueueConfig {
    /// Middleware run on push.
    pub client_middleware: ClientChain,
    /// Middleware run around execution.
    pub server_middleware: ServerChain,
    claimed_keys: BTreeSet<String>,
}

impl QueueConfig {
    /// Creates a configuration with empty chains.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a payload field is already owned by a registration.
    #[must_use]
    pub fn is_claimed(&self, key: &str) -> bool {
        self.claimed_keys.contains(key)
    }

    /// Marks a payload field as owned by a registration.
    pub fn claim(&mut self, key: impl Into<String>) {
        self.claimed_keys.insert(key.into());
    }

    /// Runs the client chain over a job about to be enqueued.
    pub async fn push(&self, job: &mut Job) -> Result<Dispatch> {
        let dispatch = self.client_middleware.run(job).await?;
        debug!(jid = ?job.jid(), ?dispatch, "client middleware finished");
        Ok(dispatch)
    }

    /// Runs the server chain and `handler` for a dequeued job.
    pub async fn process(&self, job: &Job, handler: &dyn JobHandler) -> Result<()> {
        let span = job_span(job);
        async {
            debug!("processing job");
            self.server_middleware.run(job, handler).await
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("client_middleware", &self.client_middleware.len())
            .field("server_middleware", &self.server_middleware.len())
            .field("claimed_keys", &self.claimed_keys)
            .finish()
    }
}
