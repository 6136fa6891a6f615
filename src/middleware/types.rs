//! Types shared by hook sets and the pipeline.

use crate::error::Result;
use crate::state::ProjectionSpec;
use crate::types::MigrationId;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Store operations that run through the hook pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Transact,
    Migrate,
    Get,
    Export,
}

impl Lifecycle {
    /// Whether the lifecycle has an after-chain.
    pub fn has_after(self) -> bool {
        matches!(self, Lifecycle::Transact | Lifecycle::Migrate)
    }
}

/// Descriptor of the operation a hook is invoked for.
#[derive(Clone, Debug)]
pub enum Operation {
    Transact { spec: Arc<ProjectionSpec> },
    Migrate { id: MigrationId, title: Arc<str> },
    Get { spec: Arc<ProjectionSpec> },
    Export,
}

impl Operation {
    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            Operation::Transact { .. } => Lifecycle::Transact,
            Operation::Migrate { .. } => Lifecycle::Migrate,
            Operation::Get { .. } => Lifecycle::Get,
            Operation::Export => Lifecycle::Export,
        }
    }

    /// Projection spec for transact and get operations.
    pub fn spec(&self) -> Option<&ProjectionSpec> {
        match self {
            Operation::Transact { spec } | Operation::Get { spec } => Some(spec.as_ref()),
            _ => None,
        }
    }

    /// Id and title for migrate operations.
    pub fn migration(&self) -> Option<(MigrationId, &str)> {
        match self {
            Operation::Migrate { id, title } => Some((*id, title.as_ref())),
            _ => None,
        }
    }
}

/// Input of a before hook: the state produced so far.
#[derive(Clone, Debug)]
pub struct BeforeContext {
    pub operation: Operation,
    pub state: Value,
}

/// Input of an after hook.
#[derive(Clone, Debug)]
pub struct AfterContext {
    pub operation: Operation,
    /// State paired with this hook set's before stage.
    pub state_before: Arc<Value>,
    /// State produced by the operation and the after hooks run so far.
    pub state_after: Value,
}

pub type BeforeHook = Box<dyn Fn(BeforeContext) -> Result<Value> + Send + Sync>;
pub type AfterHook = Box<dyn Fn(AfterContext) -> Result<Value> + Send + Sync>;
pub type AsyncBeforeHook =
    Box<dyn Fn(BeforeContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
pub type AsyncAfterHook =
    Box<dyn Fn(AfterContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
/// Runs once a candidate state has won the identity check, before it
/// replaces the committed state.
pub type CommitHook = Box<dyn Fn(&Operation, &Value) -> Result<()> + Send + Sync>;
