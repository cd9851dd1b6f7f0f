//! Named stacks visible to a context
//!
//! Each context owns a Registry. A launched task receives a copy of its
//! launcher's registry taken at launch time: the handles are shared (both
//! sides see the same Stack), the name table is not. Stacks declared later
//! on either side stay private to that side.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ual_core::{ElementType, Perspective, Stack};

#[derive(Debug, Default)]
pub struct Registry {
    stacks: Mutex<HashMap<String, Arc<Stack>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Stack>>> {
        self.stacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the stack named `name`, creating it if absent.
    ///
    /// An existing stack is returned as is, even when its element type or
    /// perspective differ from the requested ones; the mismatch is logged.
    pub fn declare(
        &self,
        name: &str,
        perspective: Perspective,
        element_type: ElementType,
    ) -> Arc<Stack> {
        let stack = Arc::clone(
            self.lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Stack::new(perspective, element_type))),
        );
        let (found_type, found_perspective) = (stack.element_type(), stack.perspective());
        if found_type != element_type || found_perspective != perspective {
            tracing::warn!(
                name,
                requested = %format!("{} {}", perspective, element_type),
                existing = %format!("{} {}", found_perspective, found_type),
                "stack redeclared with a different shape"
            );
        }
        stack
    }

    /// Register an existing stack under `name`, replacing any previous one
    pub fn insert(&self, name: &str, stack: Arc<Stack>) -> Option<Arc<Stack>> {
        self.lock().insert(name.to_string(), stack)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Stack>> {
        self.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Stack>> {
        self.lock().remove(name)
    }

    /// Names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A new registry sharing every current handle
    pub fn snapshot(&self) -> Registry {
        Registry {
            stacks: Mutex::new(self.lock().clone()),
        }
    }
}
