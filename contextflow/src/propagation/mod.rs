//! Context propagation across the queue boundary.
//!
//! - `registry`: wire key to class name mapping
//! - `save`: producer middleware writing context into payloads
//! - `load`: consumer middleware restoring context around handlers
//! - `setup`: wiring both into a queue configuration

mod load;
mod registry;
mod save;
mod setup;

pub use load::LoadContext;
pub use registry::{ContextClasses, ContextRegistry, WireKey};
pub use save::SaveContext;
pub use setup::{persist, Persistence};
