//! Tracing subscriber setup and job spans.
//!
//! Both initializers read `RUST_LOG` and fall back to `info`. They are safe to
//! call more than once; only the first call installs a subscriber.

use std::collections::HashMap;

use tracing::Span;
use tracing_subscriber::EnvFilter;

use crate::core::Job;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a human-readable fmt subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .try_init();
}

/// Installs a JSON subscriber with timestamps.
pub fn init_json_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Identifying attributes of a job, as recorded on its span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSpanAttributes {
    /// Job id.
    pub jid: Option<String>,
    /// Handler class name.
    pub class: Option<String>,
    /// Queue name.
    pub queue: Option<String>,
}

impl JobSpanAttributes {
    /// Reads the attributes from a job payload.
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        Self {
            jid: job.jid().map(str::to_string),
            class: job.class_name().map(str::to_string),
            queue: job.queue().map(str::to_string),
        }
    }

    /// Converts to flat `job.*` attributes, skipping missing ones.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        [("job.jid", &self.jid), ("job.class", &self.class), ("job.queue", &self.queue)]
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
            .collect()
    }
}

/// Creates the span a job runs in.
#[must_use]
pub fn job_span(job: &Job) -> Span {
    let attrs = JobSpanAttributes::from_job(job);
    tracing::info_span!(
        "job",
        jid = attrs.jid.as_deref().unwrap_or_default(),
        class = attrs.class.as_deref().unwrap_or_default(),
        queue = attrs.queue.as_deref().unwrap_or_default(),
    )
}
