// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Process-wide, string- and type-keyed service locator.
///
/// A place for a host application to stash singletons (the `Engine`, the
/// `Dispatcher`, a scheduler, ...) so unrelated parts of a large control program can
/// find them without threading references through every constructor. None of the
/// three cores use this internally; it is a convenience for host applications, kept
/// deliberately trivial.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under its type and `name`, returning the previous value (if
    /// any and if it was of the same type) so callers can tell whether they clobbered
    /// something.
    pub fn register<T: Any + Send + Sync + 'static>(&self, name: &str, value: T) -> Option<Arc<T>> {
        let key = (TypeId::of::<T>(), name.to_string());
        let prev = self.objects.write().insert(key, Arc::new(value));
        prev.and_then(|p| p.downcast::<T>().ok())
    }

    pub fn get<T: Any + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let key = (TypeId::of::<T>(), name.to_string());
        self.objects.read().get(&key).cloned().and_then(|v| v.downcast::<T>().ok())
    }

    pub fn remove<T: Any + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let key = (TypeId::of::<T>(), name.to_string());
        self.objects.write().remove(&key).and_then(|v| v.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
