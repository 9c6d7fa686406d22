//! # Contextflow
//!
//! Carries ambient request context from the code that enqueues a background
//! job into the worker that executes it.
//!
//! Contextflow provides:
//!
//! - **Ambient context classes**: named sets of attributes scoped to the
//!   current task, with setter hooks
//! - **Producer middleware**: snapshots registered classes into the job payload
//! - **Consumer middleware**: restores them around the handler, resolving
//!   entity references and tolerating schema drift
//! - **Reference tokens**: stable string identifiers for persisted entities
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contextflow::prelude::*;
//!
//! let catalog = Arc::new(ClassCatalog::new());
//! catalog.define(Arc::new(CurrentAttributes::new("Current").declare_all(["account", "request_id"])));
//!
//! let mut config = QueueConfig::new();
//! persist(["Current"], &mut config, catalog, locator);
//!
//! // Producer side
//! config.push(&mut job).await?;
//! // Worker side
//! config.process(&job, &handler).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod middleware;
pub mod observability;
pub mod propagation;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PersistConfig;
    pub use crate::context::{ambient, ClassCatalog, ContextClass, CurrentAttributes};
    pub use crate::core::{
        AttributeMap, AttributeValue, Entity, EntityLocator, InMemoryLocator, Job,
        ReferenceToken,
    };
    pub use crate::errors::{ContextflowError, ContractErrorInfo, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::middleware::{
        handler_fn, ClientMiddleware, ClientNext, Dispatch, JobHandler, QueueConfig,
        ServerMiddleware, ServerNext,
    };
    pub use crate::propagation::{persist, ContextRegistry, LoadContext, Persistence, SaveContext};
    pub use std::sync::Arc;
}
