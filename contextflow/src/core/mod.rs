//! Core types: job payloads, attribute values and reference tokens.

mod job;
mod reference;
mod value;

pub use job::Job;
pub use reference::{Entity, EntityLocator, InMemoryLocator, ReferenceToken};
pub use value::{encode_attributes, AttributeMap, AttributeValue};
