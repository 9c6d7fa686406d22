//! Ambient context management.
//!
//! This module provides:
//! - The task-local ambient store with scoped activation
//! - The `ContextClass` capability and its standard implementation
//! - A catalog for resolving class names at use time

pub mod ambient;
mod catalog;
mod class;

pub use ambient::AmbientStore;
pub use catalog::ClassCatalog;
pub use class::{ContextClass, CurrentAttributes, Setter};
