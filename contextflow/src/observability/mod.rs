//! Observability utilities.

mod tracing;

pub use tracing::{init_json_tracing, init_tracing, job_span, JobSpanAttributes};
