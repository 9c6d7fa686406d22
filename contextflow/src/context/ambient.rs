//! Task-local ambient context.
//!
//! Every scope owns its own [`AmbientStore`]. Activating a context class forks
//! the enclosing store, applies the new values and runs the inner future with
//! the fork installed. When the future completes, fails, panics or is dropped
//! the enclosing store is visible again, so nothing written inside a scope
//! leaks out of it.

use crate::core::{AttributeMap, AttributeValue};
use crate::errors::{ContextflowError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::futures::TaskLocalFuture;

tokio::task_local! {
    static AMBIENT: AmbientStore;
}

/// Attribute values for every context class in one scope.
#[derive(Debug, Clone, Default)]
pub struct AmbientStore {
    classes: Arc<RwLock<HashMap<String, AttributeMap>>>,
}

impl AmbientStore {
    fn fork(&self) -> Self {
        Self {
            classes: Arc::new(RwLock::new(self.classes.read().clone())),
        }
    }

    fn fork_with(&self, class: &str, values: AttributeMap) -> Self {
        let forked = self.fork();
        forked
            .classes
            .write()
            .entry(class.to_string())
            .or_default()
            .extend(values);
        forked
    }

    fn attributes(&self, class: &str) -> AttributeMap {
        self.classes.read().get(class).cloned().unwrap_or_default()
    }
}

fn current() -> AmbientStore {
    AMBIENT.try_with(Clone::clone).unwrap_or_default()
}

/// Runs `fut` inside a fresh, empty scope.
///
/// This is the request boundary: attributes set inside are gone once `fut`
/// finishes.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    AMBIENT.scope(AmbientStore::default(), fut).await
}

/// Runs `f` inside a fresh, empty scope on the current thread.
pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
    AMBIENT.sync_scope(AmbientStore::default(), f)
}

/// Runs `fut` with `values` installed for `class` on top of the enclosing scope.
///
/// Values are merged over whatever `class` already holds. No validation is
/// done here; callers go through [`ContextClass::try_set`](super::ContextClass::try_set) first.
pub fn activate<F: Future>(class: &str, values: AttributeMap, fut: F) -> TaskLocalFuture<AmbientStore, F> {
    AMBIENT.scope(current().fork_with(class, values), fut)
}

/// Runs `fut` in a copy of the enclosing scope, or in a fresh one if none is
/// active. Writes made inside never reach the enclosing scope.
pub fn nest<F: Future>(fut: F) -> TaskLocalFuture<AmbientStore, F> {
    AMBIENT.scope(current().fork(), fut)
}

/// Returns true if a scope is active on this task.
#[must_use]
pub fn is_active() -> bool {
    AMBIENT.try_with(|_| ()).is_ok()
}

/// Returns every attribute currently set for `class`.
#[must_use]
pub fn attributes(class: &str) -> AttributeMap {
    AMBIENT
        .try_with(|store| store.attributes(class))
        .unwrap_or_default()
}

/// Returns one attribute of `class`.
#[must_use]
pub fn get(class: &str, attribute: &str) -> Option<AttributeValue> {
    AMBIENT
        .try_with(|store| {
            store
                .classes
                .read()
                .get(class)
                .and_then(|values| values.get(attribute).cloned())
        })
        .ok()
        .flatten()
}

/// Writes attributes of `class` into the active scope.
pub fn set_many(class: &str, values: AttributeMap) -> Result<()> {
    AMBIENT
        .try_with(|store| {
            store
                .classes
                .write()
                .entry(class.to_string())
                .or_default()
                .extend(values);
        })
        .map_err(|_| ContextflowError::NoActiveScope)
}

/// Clears every attribute of `class` in the active scope.
pub fn reset(class: &str) {
    let _ = AMBIENT.try_with(|store| store.classes.write().remove(class));
}
