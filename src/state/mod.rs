//! State access: paths, projections, drafts and the transaction core.
//!
//! A transaction projects a set of named paths out of a private copy of
//! the state, lets the caller mutate a copy-on-write draft of that view,
//! and writes the finalized view back into the copy.

pub mod draft;
pub mod path;
pub mod projection;
pub mod transaction;

pub use draft::{Draft, SharedDraft};
pub use path::{read, write, IntoPath, Path, Seg};
pub use projection::{project, write_back, ProjectionSpec, Slot, WorkingView};
