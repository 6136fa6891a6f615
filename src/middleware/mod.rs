//! Interception pipeline around store operations.
//!
//! A [`HookSet`] bundles optional before and after hooks per lifecycle.
//! The store composes its hook sets into a [`Pipeline`]: before hooks run
//! in declared order, after hooks in reverse order, each after hook paired
//! with the state produced by the closest preceding before hook.

pub mod logging;
pub mod pipeline;
pub mod types;

pub use logging::{
    logging_hooks, logging_hooks_with_sink, HookKind, LogEntry, LogSink, LoggingOptions,
};
pub use pipeline::{HookSet, Pairing, Pipeline};
pub use types::{AfterContext, BeforeContext, Lifecycle, Operation};
