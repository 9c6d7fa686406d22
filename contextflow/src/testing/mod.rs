//! Testing utilities for context propagation.
//!
//! This module provides:
//! - Fixture entities, context classes and a seeded world
//! - Handlers that record the ambient context they observe
//! - An in-memory queue that serializes jobs between push and process

mod fixtures;
mod mocks;
mod queue;

pub use fixtures::{current2_class, current_class, Account, FixtureWorld, User, FIXTURE_APP};
pub use mocks::{AmbientSnapshot, FailingHandler, RecordingHandler, SlowHandler};
pub use queue::InMemoryQueue;
