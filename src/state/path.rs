//! Paths into the state tree and tolerant traversal over them.
//!
//! A path is a non-empty sequence of segments. Each segment is either an
//! object key or an array index. Traversal never fails: reading through a
//! missing or non-container node yields `None`, and writing through one is
//! dropped.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A single segment in a path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Object member access.
    Key(String),
    /// Array element access.
    Index(usize),
}

impl Seg {
    /// Parse a single token. All-digit tokens become indices.
    pub fn parse(token: &str) -> Self {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse::<usize>() {
                return Seg::Index(index);
            }
        }
        Seg::Key(token.to_owned())
    }

    /// Rewrite numeric-looking keys as indices.
    fn normalize(self) -> Self {
        match self {
            Seg::Key(key) => Seg::parse(&key),
            index => index,
        }
    }

    /// The object key this segment addresses.
    fn member_key(&self) -> String {
        match self {
            Seg::Key(key) => key.clone(),
            Seg::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(key) => write!(f, "{}", key),
            Seg::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::parse(s)
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s).normalize()
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A complete, non-empty path into the state.
///
/// # Examples
///
/// ```
/// use jsonstore::{path, Path, Seg};
///
/// let parsed: Path = "users.0.name".parse().unwrap();
/// assert_eq!(parsed, path!("users", 0, "name"));
/// assert_eq!(parsed.segments()[1], Seg::Index(0));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Seg>", into = "Vec<Seg>")]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create a single-segment path.
    pub fn new(first: impl Into<Seg>) -> Self {
        Path(vec![first.into().normalize()])
    }

    /// Parse a dot-joined descriptor such as `"a.b.0.c"`.
    pub fn parse(descriptor: &str) -> Result<Self> {
        if descriptor.is_empty() {
            return Err(StoreError::InvalidPath("empty path descriptor".into()));
        }
        Ok(Path(descriptor.split('.').map(Seg::parse).collect()))
    }

    /// Build a path from explicit segments, coercing numeric keys to indices.
    pub fn from_segments(segments: impl IntoIterator<Item = Seg>) -> Result<Self> {
        let segments: Vec<Seg> = segments.into_iter().map(Seg::normalize).collect();
        if segments.is_empty() {
            return Err(StoreError::InvalidPath("path must have at least one segment".into()));
        }
        Ok(Path(segments))
    }

    /// Append a segment and return the extended path.
    pub fn child(mut self, seg: impl Into<Seg>) -> Self {
        self.0.push(seg.into().normalize());
        self
    }

    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Number of segments (always at least one).
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

impl TryFrom<Vec<Seg>> for Path {
    type Error = StoreError;

    fn try_from(segments: Vec<Seg>) -> Result<Self> {
        Path::from_segments(segments)
    }
}

impl From<Path> for Vec<Seg> {
    fn from(path: Path) -> Self {
        path.0
    }
}

/// Anything that can describe a path: descriptors, segment lists, paths.
pub trait IntoPath {
    fn into_path(self) -> Result<Path>;
}

impl IntoPath for Path {
    fn into_path(self) -> Result<Path> {
        Ok(self)
    }
}

impl IntoPath for &Path {
    fn into_path(self) -> Result<Path> {
        Ok(self.clone())
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Result<Path> {
        Path::parse(self)
    }
}

impl IntoPath for String {
    fn into_path(self) -> Result<Path> {
        Path::parse(&self)
    }
}

impl IntoPath for Vec<Seg> {
    fn into_path(self) -> Result<Path> {
        Path::from_segments(self)
    }
}

impl<const N: usize> IntoPath for [Seg; N] {
    fn into_path(self) -> Result<Path> {
        Path::from_segments(self)
    }
}

/// Construct a `Path` from one or more segments.
///
/// String literals become keys (or indices when all digits), integers
/// become indices.
///
/// ```
/// use jsonstore::path;
///
/// let p = path!("field3", "test2", 0, "n");
/// assert_eq!(p.to_string(), "field3.test2.0.n");
/// ```
#[macro_export]
macro_rules! path {
    ($first:expr $(, $rest:expr)* $(,)?) => {
        $crate::Path::new($crate::Seg::from($first))$(.child($crate::Seg::from($rest)))*
    };
}

fn step<'a>(node: &'a Value, seg: &Seg) -> Option<&'a Value> {
    match (node, seg) {
        (Value::Object(map), seg) => map.get(&seg.member_key()),
        (Value::Array(items), Seg::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, seg: &Seg) -> Option<&'a mut Value> {
    match (node, seg) {
        (Value::Object(map), seg) => map.get_mut(&seg.member_key()),
        (Value::Array(items), Seg::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

/// Read the value at `path`. `None` means the path is unreachable.
pub fn read<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, seg| step(node, seg))
}

/// Overwrite the value at `path`.
///
/// Returns `false` when the parent container could not be reached and the
/// write was dropped. Intermediate containers are never created.
pub fn write(root: &mut Value, path: &Path, value: Value) -> bool {
    let Some((last, parents)) = path.segments().split_last() else {
        return false;
    };

    let mut node = root;
    for seg in parents {
        node = match step_mut(node, seg) {
            Some(next) => next,
            None => {
                tracing::trace!(%path, "dropped write through unreachable parent");
                return false;
            }
        };
    }

    match (node, last) {
        (Value::Object(map), seg) => {
            map.insert(seg.member_key(), value);
            true
        }
        (Value::Array(items), Seg::Index(index)) => {
            if *index < items.len() {
                items[*index] = value;
                true
            } else if *index == items.len() {
                items.push(value);
                true
            } else {
                tracing::trace!(%path, len = items.len(), "dropped write past array end");
                false
            }
        }
        _ => {
            tracing::trace!(%path, "dropped write into non-container");
            false
        }
    }
}
