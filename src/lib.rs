//! # JSON Store
//!
//! An in-process JSON state container with transactional updates,
//! versioned migrations and a composable hook pipeline.
//!
//! ## Core Concepts
//!
//! - **Paths**: dotted descriptors like `"a.b.0"` addressing one location
//! - **Projections**: named paths pulled out of the state into a flat view
//! - **Transactions**: copy-on-write drafts of a projection, committed with
//!   optimistic concurrency
//! - **Migrations**: transforms applied exactly once, recorded in the state
//! - **Hooks**: before and after interception of every operation
//!
//! ## Example
//!
//! ```ignore
//! use jsonstore::{ProjectionSpec, Store, StoreError};
//! use serde_json::json;
//!
//! let store = Store::new(json!({"user": {"visits": 1}}));
//!
//! store.migrate("add settings", |mut state| {
//!     state["settings"] = json!({"theme": "dark"});
//!     Ok::<_, StoreError>(state)
//! })?;
//!
//! let spec = ProjectionSpec::parse([("visits", "user.visits")])?;
//! store.transact(&spec, |draft| {
//!     draft.update("visits", |v| *v = json!(v.as_i64().unwrap_or(0) + 1));
//!     Ok::<_, StoreError>(())
//! })?;
//! ```

pub mod error;
pub mod middleware;
pub mod migrations;
pub mod persistence;
pub mod state;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use middleware::{
    logging_hooks, logging_hooks_with_sink, AfterContext, BeforeContext, HookSet, Lifecycle,
    LoggingOptions, Operation,
};
pub use persistence::FileStore;
pub use state::{Draft, IntoPath, Path, ProjectionSpec, Seg, SharedDraft, Slot, WorkingView};
pub use store::{AsyncTransactOptions, Store, StoreConfig, TransactOptions};
pub use types::*;
