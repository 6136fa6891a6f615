//! Copy-on-write drafts over a working view.
//!
//! A draft keeps the projected view untouched as its base and records
//! every changed binding separately. Nothing is copied until a binding is
//! first mutated.

use crate::error::{Result, StoreError};
use crate::state::projection::{Slot, WorkingView};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mutable surface handed to a transaction body.
#[derive(Debug, Default)]
pub struct Draft {
    base: BTreeMap<String, Slot>,
    changes: BTreeMap<String, Slot>,
}

impl Draft {
    pub fn new(view: WorkingView) -> Self {
        Self {
            base: view.into_slots(),
            changes: BTreeMap::new(),
        }
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.changes.get(name).or_else(|| self.base.get(name))
    }

    /// Current value of a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slot(name).and_then(Slot::as_value)
    }

    /// Deserialize the current value of a binding.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| StoreError::Deserialization(e.to_string()))
            })
            .transpose()
    }

    /// Value of a binding as it was projected, ignoring changes.
    pub fn original(&self, name: &str) -> Option<&Value> {
        self.base.get(name).and_then(Slot::as_value)
    }

    /// Mutable access to a present binding. Copies it on first use.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if !self.changes.contains_key(name) {
            let slot = self.base.get(name)?;
            if slot.is_absent() {
                return None;
            }
            self.changes.insert(name.to_owned(), slot.clone());
        }
        self.changes.get_mut(name).and_then(Slot::as_value_mut)
    }

    /// Replace the value of a binding.
    ///
    /// Names that are not bound in the projection are kept in the draft
    /// but never written back.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.changes.insert(name.into(), Slot::Present(value));
    }

    pub fn set_as<T: Serialize>(&mut self, name: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(name, value);
        Ok(())
    }

    /// Mutate a present binding in place. Returns false when it is absent.
    pub fn update<F>(&mut self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut Value),
    {
        match self.get_mut(name) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Mark a binding absent so it is not written back.
    pub fn remove(&mut self, name: impl Into<String>) {
        self.changes.insert(name.into(), Slot::Absent);
    }

    /// Whether any binding differs from its projected value.
    pub fn is_modified(&self) -> bool {
        self.changes
            .iter()
            .any(|(name, slot)| self.base.get(name) != Some(slot))
    }

    /// Merge changes over the base into a plain view.
    pub fn finalize(self) -> WorkingView {
        let Draft { mut base, changes } = self;
        let mut modified = std::collections::BTreeSet::new();

        for (name, slot) in changes {
            if base.get(&name) != Some(&slot) {
                modified.insert(name.clone());
            }
            base.insert(name, slot);
        }

        WorkingView::from_parts(base, modified)
    }
}

/// Cloneable draft handle for asynchronous transaction bodies.
///
/// The lock is never held across an await point by the store; bodies
/// should likewise keep their `with` closures synchronous.
///
/// The store takes the draft out once the body's future resolves. Clones
/// kept past that point write into an empty draft nobody reads, so those
/// writes are lost.
#[derive(Clone, Debug, Default)]
pub struct SharedDraft(Arc<Mutex<Draft>>);

impl SharedDraft {
    pub fn new(draft: Draft) -> Self {
        Self(Arc::new(Mutex::new(draft)))
    }

    /// Cloned current value of a binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.lock().get(name).cloned()
    }

    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.0.lock().get_as(name)
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.lock().set(name, value);
    }

    pub fn update<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut Value),
    {
        self.0.lock().update(name, f)
    }

    pub fn remove(&self, name: impl Into<String>) {
        self.0.lock().remove(name);
    }

    /// Run `f` with exclusive access to the underlying draft.
    pub fn with<R>(&self, f: impl FnOnce(&mut Draft) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Take the draft out, leaving an empty one behind. Later writes
    /// through any clone of this handle land in the empty draft.
    pub(crate) fn take(&self) -> Draft {
        std::mem::take(&mut *self.0.lock())
    }
}
