//! Hook sets and their composition into per-lifecycle chains.

use crate::error::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::types::{
    AfterContext, AfterHook, AsyncAfterHook, AsyncBeforeHook, BeforeContext, BeforeHook,
    CommitHook, Lifecycle, Operation,
};

/// Hooks of one hook set for one lifecycle.
#[derive(Default)]
struct Stage {
    before: Option<BeforeHook>,
    before_async: Option<AsyncBeforeHook>,
    after: Option<AfterHook>,
    after_async: Option<AsyncAfterHook>,
    commit: Option<CommitHook>,
}

impl Stage {
    fn has_before(&self) -> bool {
        self.before.is_some() || self.before_async.is_some()
    }

    fn has_after(&self) -> bool {
        self.after.is_some() || self.after_async.is_some()
    }
}

/// One contributor's bundle of optional hooks.
///
/// Unset hooks behave as identity. Synchronous store operations only run
/// synchronous hooks; asynchronous operations prefer the async variant and
/// fall back to the synchronous one.
#[derive(Default)]
pub struct HookSet {
    name: String,
    transact: Stage,
    migrate: Stage,
    get: Stage,
    export: Stage,
}

impl HookSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self, lifecycle: Lifecycle) -> &Stage {
        match lifecycle {
            Lifecycle::Transact => &self.transact,
            Lifecycle::Migrate => &self.migrate,
            Lifecycle::Get => &self.get,
            Lifecycle::Export => &self.export,
        }
    }

    fn stage_mut(&mut self, lifecycle: Lifecycle) -> &mut Stage {
        match lifecycle {
            Lifecycle::Transact => &mut self.transact,
            Lifecycle::Migrate => &mut self.migrate,
            Lifecycle::Get => &mut self.get,
            Lifecycle::Export => &mut self.export,
        }
    }

    pub fn has_before(&self, lifecycle: Lifecycle) -> bool {
        self.stage(lifecycle).has_before()
    }

    pub fn has_after(&self, lifecycle: Lifecycle) -> bool {
        self.stage(lifecycle).has_after()
    }

    pub fn has_commit(&self, lifecycle: Lifecycle) -> bool {
        self.stage(lifecycle).commit.is_some()
    }

    /// Set the before hook of any lifecycle.
    pub fn before<F>(mut self, lifecycle: Lifecycle, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.stage_mut(lifecycle).before = Some(Box::new(hook));
        self
    }

    pub fn before_async<F, Fut>(mut self, lifecycle: Lifecycle, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.stage_mut(lifecycle).before_async = Some(Box::new(
            move |ctx: BeforeContext| -> BoxFuture<'static, Result<Value>> { Box::pin(hook(ctx)) },
        ));
        self
    }

    /// Set the after hook of a lifecycle. Get and export have no after
    /// chain; hooks set for them are never run.
    pub fn after<F>(mut self, lifecycle: Lifecycle, hook: F) -> Self
    where
        F: Fn(AfterContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.stage_mut(lifecycle).after = Some(Box::new(hook));
        self
    }

    pub fn after_async<F, Fut>(mut self, lifecycle: Lifecycle, hook: F) -> Self
    where
        F: Fn(AfterContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.stage_mut(lifecycle).after_async = Some(Box::new(
            move |ctx: AfterContext| -> BoxFuture<'static, Result<Value>> { Box::pin(hook(ctx)) },
        ));
        self
    }

    /// Set the commit hook of a lifecycle.
    ///
    /// Commit hooks see only states that are about to become the committed
    /// state. They run under the store's state lock, so they must not call
    /// back into the store. An error aborts the commit and leaves the
    /// committed state unchanged. Get and export never commit.
    pub fn on_commit<F>(mut self, lifecycle: Lifecycle, hook: F) -> Self
    where
        F: Fn(&Operation, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.stage_mut(lifecycle).commit = Some(Box::new(hook));
        self
    }

    pub fn before_transact<F>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.before(Lifecycle::Transact, hook)
    }

    pub fn before_transact_async<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.before_async(Lifecycle::Transact, hook)
    }

    pub fn after_transact<F>(self, hook: F) -> Self
    where
        F: Fn(AfterContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.after(Lifecycle::Transact, hook)
    }

    pub fn after_transact_async<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(AfterContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.after_async(Lifecycle::Transact, hook)
    }

    pub fn before_migrate<F>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.before(Lifecycle::Migrate, hook)
    }

    pub fn before_migrate_async<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.before_async(Lifecycle::Migrate, hook)
    }

    pub fn after_migrate<F>(self, hook: F) -> Self
    where
        F: Fn(AfterContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.after(Lifecycle::Migrate, hook)
    }

    pub fn after_migrate_async<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(AfterContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.after_async(Lifecycle::Migrate, hook)
    }

    pub fn on_get<F>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.before(Lifecycle::Get, hook)
    }

    pub fn on_get_async<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.before_async(Lifecycle::Get, hook)
    }

    pub fn on_export<F>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.before(Lifecycle::Export, hook)
    }

    pub fn on_export_async<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(BeforeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.before_async(Lifecycle::Export, hook)
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks: Vec<String> = [
            Lifecycle::Transact,
            Lifecycle::Migrate,
            Lifecycle::Get,
            Lifecycle::Export,
        ]
        .into_iter()
        .flat_map(|lifecycle| {
            let stage = self.stage(lifecycle);
            let before = stage.has_before().then(|| format!("before {:?}", lifecycle));
            let after = stage.has_after().then(|| format!("after {:?}", lifecycle));
            let commit = stage
                .commit
                .is_some()
                .then(|| format!("commit {:?}", lifecycle));
            before.into_iter().chain(after).chain(commit)
        })
        .collect();

        f.debug_struct("HookSet")
            .field("name", &self.name)
            .field("hooks", &hooks)
            .finish()
    }
}

/// Before-states recorded per hook set index during one operation.
#[derive(Debug, Default)]
pub struct Pairing {
    recorded: Vec<(usize, Arc<Value>)>,
}

impl Pairing {
    fn record(&mut self, index: usize, state: &Value) {
        self.recorded.push((index, Arc::new(state.clone())));
    }

    /// State paired with the hook set at `index`: the output of the closest
    /// before hook at or before `index`, else `fallback`.
    pub fn state_before(&self, index: usize, fallback: &Arc<Value>) -> Arc<Value> {
        self.recorded
            .iter()
            .rev()
            .find(|(recorded, _)| *recorded <= index)
            .map(|(_, state)| Arc::clone(state))
            .unwrap_or_else(|| Arc::clone(fallback))
    }
}

/// Ordered hook sets, fixed for the lifetime of a store.
#[derive(Debug, Default)]
pub struct Pipeline {
    sets: Vec<HookSet>,
}

impl Pipeline {
    pub fn new(sets: Vec<HookSet>) -> Self {
        Self { sets }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Whether any hook set has a hook for `lifecycle`.
    pub fn has_hooks(&self, lifecycle: Lifecycle) -> bool {
        self.sets.iter().any(|set| {
            set.has_before(lifecycle)
                || (lifecycle.has_after()
                    && (set.has_after(lifecycle) || set.has_commit(lifecycle)))
        })
    }

    fn needs_pairing(&self, lifecycle: Lifecycle) -> bool {
        lifecycle.has_after() && self.sets.iter().any(|set| set.has_after(lifecycle))
    }

    /// Run the before-chain in declared order.
    pub fn run_before(&self, operation: &Operation, mut state: Value) -> Result<(Value, Pairing)> {
        let lifecycle = operation.lifecycle();
        let pair = self.needs_pairing(lifecycle);
        let mut pairing = Pairing::default();

        for (index, set) in self.sets.iter().enumerate() {
            let Some(hook) = &set.stage(lifecycle).before else {
                continue;
            };
            state = hook(BeforeContext {
                operation: operation.clone(),
                state,
            })?;
            if pair {
                pairing.record(index, &state);
            }
        }

        Ok((state, pairing))
    }

    /// Run the after-chain in reverse declared order.
    pub fn run_after(
        &self,
        operation: &Operation,
        pairing: &Pairing,
        fallback: &Arc<Value>,
        mut state: Value,
    ) -> Result<Value> {
        let lifecycle = operation.lifecycle();
        if !lifecycle.has_after() {
            return Ok(state);
        }

        for (index, set) in self.sets.iter().enumerate().rev() {
            let Some(hook) = &set.stage(lifecycle).after else {
                continue;
            };
            state = hook(AfterContext {
                operation: operation.clone(),
                state_before: pairing.state_before(index, fallback),
                state_after: state,
            })?;
        }

        Ok(state)
    }

    /// Run the commit hooks in declared order, stopping at the first
    /// error.
    pub fn run_commit(&self, operation: &Operation, state: &Value) -> Result<()> {
        let lifecycle = operation.lifecycle();
        if !lifecycle.has_after() {
            return Ok(());
        }

        for set in &self.sets {
            if let Some(hook) = &set.stage(lifecycle).commit {
                hook(operation, state)?;
            }
        }

        Ok(())
    }

    pub async fn run_before_async(
        &self,
        operation: &Operation,
        mut state: Value,
    ) -> Result<(Value, Pairing)> {
        let lifecycle = operation.lifecycle();
        let pair = self.needs_pairing(lifecycle);
        let mut pairing = Pairing::default();

        for (index, set) in self.sets.iter().enumerate() {
            let stage = set.stage(lifecycle);
            let ctx = |state| BeforeContext {
                operation: operation.clone(),
                state,
            };
            state = if let Some(hook) = &stage.before_async {
                hook(ctx(state)).await?
            } else if let Some(hook) = &stage.before {
                hook(ctx(state))?
            } else {
                continue;
            };
            if pair {
                pairing.record(index, &state);
            }
        }

        Ok((state, pairing))
    }

    pub async fn run_after_async(
        &self,
        operation: &Operation,
        pairing: &Pairing,
        fallback: &Arc<Value>,
        mut state: Value,
    ) -> Result<Value> {
        let lifecycle = operation.lifecycle();
        if !lifecycle.has_after() {
            return Ok(state);
        }

        for (index, set) in self.sets.iter().enumerate().rev() {
            let stage = set.stage(lifecycle);
            let ctx = |state| AfterContext {
                operation: operation.clone(),
                state_before: pairing.state_before(index, fallback),
                state_after: state,
            };
            state = if let Some(hook) = &stage.after_async {
                hook(ctx(state)).await?
            } else if let Some(hook) = &stage.after {
                hook(ctx(state))?
            } else {
                continue;
            };
        }

        Ok(state)
    }
}
