//! Runtime registry of tool descriptors.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::descriptor::{ToolDescriptor, ToolSummary};

/// Registry that owns tool descriptors keyed by name.
///
/// Populated at startup and read for every request. Registration takes a
/// write lock so descriptors may also be swapped while the process runs.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<HashMap<String, Arc<ToolDescriptor>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, replacing any previous descriptor with the same name.
    ///
    /// Returns the replaced descriptor, if any.
    pub fn register(&self, descriptor: ToolDescriptor) -> Option<Arc<ToolDescriptor>> {
        let name = descriptor.name().to_owned();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let previous = inner.insert(name.clone(), Arc::new(descriptor));
        if previous.is_some() {
            info!(tool = %name, "tool descriptor replaced");
        } else {
            debug!(tool = %name, "tool registered");
        }
        previous
    }

    /// Returns the descriptor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(name).cloned()
    }

    /// Returns `true` when a tool with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.contains_key(name)
    }

    /// Returns all descriptors sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut descriptors: Vec<_> = inner.values().cloned().collect();
        descriptors.sort_by(|a, b| a.name().cmp(b.name()));
        descriptors
    }

    /// Returns discovery summaries for all tools, sorted by name.
    #[must_use]
    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.list().iter().map(|tool| tool.summary()).collect()
    }

    /// Returns the registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = inner.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
