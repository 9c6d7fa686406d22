//! Producer and consumer middleware plumbing.

mod chain;
mod handler;
mod queue;

pub use chain::{ClientChain, ClientMiddleware, ClientNext, Dispatch, ServerChain, ServerMiddleware, ServerNext};
pub use handler::{handler_fn, FnHandler, JobHandler};
pub use queue::QueueConfig;
