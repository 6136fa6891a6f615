//! Projection of named paths into a flat working view, and back.

use crate::error::{Result, StoreError};
use crate::state::path::{self, IntoPath, Path};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// Named path bindings for a `get` or `transact` call.
///
/// Serializes as `{"binding": ["seg", 0, ...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionSpec(BTreeMap<String, Path>);

impl ProjectionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a path descriptor, segment list or `Path`.
    pub fn bind(mut self, name: impl Into<String>, path: impl IntoPath) -> Result<Self> {
        self.0.insert(name.into(), path.into_path()?);
        Ok(self)
    }

    /// Bind `name` to an already-built path.
    pub fn with(mut self, name: impl Into<String>, path: Path) -> Self {
        self.0.insert(name.into(), path);
        self
    }

    /// Build a spec from `(name, descriptor)` pairs.
    pub fn parse<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        pairs
            .into_iter()
            .try_fold(Self::new(), |spec, (name, descriptor)| spec.bind(name, descriptor))
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Path> {
        self.0.iter()
    }
}

/// Value of one binding in a working view.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// The path could not be reached in the source state.
    Absent,
    Present(Value),
}

impl Slot {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Present(value) => Some(value),
            Slot::Absent => None,
        }
    }

    pub fn as_value_mut(&mut self) -> Option<&mut Value> {
        match self {
            Slot::Present(value) => Some(value),
            Slot::Absent => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Slot::Present(value) => Some(value),
            Slot::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Slot::Absent)
    }
}

impl From<Option<&Value>> for Slot {
    fn from(value: Option<&Value>) -> Self {
        match value {
            Some(value) => Slot::Present(value.clone()),
            None => Slot::Absent,
        }
    }
}

/// Flat mapping from binding name to the value found at its path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkingView {
    slots: BTreeMap<String, Slot>,
    /// Bindings changed through a draft; written back last.
    modified: BTreeSet<String>,
}

impl WorkingView {
    pub(crate) fn from_parts(slots: BTreeMap<String, Slot>, modified: BTreeSet<String>) -> Self {
        Self { slots, modified }
    }

    /// Value of a binding, `None` if it is absent or not bound at all.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).and_then(Slot::as_value)
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    /// Deserialize a binding into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| StoreError::Deserialization(e.to_string()))
            })
            .transpose()
    }

    /// True when `name` is bound but its path was unreachable.
    pub fn is_absent(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(Slot::Absent))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Slot> {
        self.slots.iter()
    }

    pub(crate) fn into_slots(self) -> BTreeMap<String, Slot> {
        self.slots
    }

    fn is_modified(&self, name: &str) -> bool {
        self.modified.contains(name)
    }
}

/// Read every binding of `spec` from `state`.
pub fn project(state: &Value, spec: &ProjectionSpec) -> WorkingView {
    let slots = spec
        .iter()
        .map(|(name, path)| (name.clone(), Slot::from(path::read(state, path))))
        .collect();
    WorkingView::from_parts(slots, BTreeSet::new())
}

/// Write every present binding of `view` into `state`.
///
/// Untouched bindings are written first so that edits made through a draft
/// win over overlapping parent bindings.
pub fn write_back(spec: &ProjectionSpec, view: &WorkingView, state: &mut Value) {
    let (modified, untouched): (Vec<_>, Vec<_>) = spec
        .iter()
        .partition(|(name, _)| view.is_modified(name));

    for (name, path) in untouched.into_iter().chain(modified) {
        if let Some(value) = view.get(name) {
            path::write(state, path, value.clone());
        }
    }
}
