//! Main Store struct tying all components together.

use crate::error::{Result, StoreError};
use crate::middleware::{HookSet, Lifecycle, Operation, Pipeline};
use crate::migrations;
use crate::persistence::FileStore;
use crate::state::transaction;
use crate::state::{project, Draft, ProjectionSpec, SharedDraft, WorkingView};
use crate::types::{MigrationId, MigrationRecord, StoreStats};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Store configuration.
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    /// File the state is loaded from and written to on every commit.
    pub persist_path: Option<PathBuf>,

    /// Conflicts tolerated per transaction before giving up.
    /// `None` retries until the commit succeeds.
    pub max_retries: Option<u32>,

    /// Reject the synchronous operations.
    pub async_only: bool,

    /// Id the migration counter starts from. The first `migrate` call uses
    /// the id after it.
    pub initial_migration_id: MigrationId,
}

/// Per-call options of [`Store::transact_with`].
pub struct TransactOptions<'a, R> {
    max_retries: Option<u32>,
    on_commit: Option<Box<dyn FnMut(&R) + 'a>>,
    on_rollback: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a, R> TransactOptions<'a, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override [`StoreConfig::max_retries`] for this call.
    pub fn max_retries(mut self, limit: u32) -> Self {
        self.max_retries = Some(limit);
        self
    }

    /// Called with the body's result once its state is committed.
    pub fn on_commit(mut self, callback: impl FnMut(&R) + 'a) -> Self {
        self.on_commit = Some(Box::new(callback));
        self
    }

    /// Called for every attempt discarded because another commit landed
    /// first, before the retry ceiling is checked.
    pub fn on_rollback(mut self, callback: impl FnMut() + 'a) -> Self {
        self.on_rollback = Some(Box::new(callback));
        self
    }
}

impl<R> Default for TransactOptions<'_, R> {
    fn default() -> Self {
        Self {
            max_retries: None,
            on_commit: None,
            on_rollback: None,
        }
    }
}

impl<R> fmt::Debug for TransactOptions<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactOptions")
            .field("max_retries", &self.max_retries)
            .field("on_commit", &self.on_commit.is_some())
            .field("on_rollback", &self.on_rollback.is_some())
            .finish()
    }
}

type AsyncCommitCallback<'a, R> = Box<dyn FnMut(&R) -> BoxFuture<'a, ()> + Send + 'a>;
type AsyncRollbackCallback<'a> = Box<dyn FnMut() -> BoxFuture<'a, ()> + Send + 'a>;

/// Per-call options of [`Store::transact_async_with`]. Callbacks are
/// awaited before the transaction resolves or retries.
pub struct AsyncTransactOptions<'a, R> {
    max_retries: Option<u32>,
    on_commit: Option<AsyncCommitCallback<'a, R>>,
    on_rollback: Option<AsyncRollbackCallback<'a>>,
}

impl<'a, R> AsyncTransactOptions<'a, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override [`StoreConfig::max_retries`] for this call.
    pub fn max_retries(mut self, limit: u32) -> Self {
        self.max_retries = Some(limit);
        self
    }

    /// Called with the body's result once its state is committed.
    ///
    /// The returned future must not borrow the result; copy out what it
    /// needs first.
    pub fn on_commit<F, Fut>(mut self, mut callback: F) -> Self
    where
        F: FnMut(&R) -> Fut + Send + 'a,
        Fut: Future<Output = ()> + Send + 'a,
    {
        self.on_commit = Some(Box::new(move |result: &R| -> BoxFuture<'a, ()> {
            Box::pin(callback(result))
        }));
        self
    }

    /// Called for every discarded attempt, before the retry ceiling is
    /// checked.
    pub fn on_rollback<F, Fut>(mut self, mut callback: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = ()> + Send + 'a,
    {
        self.on_rollback = Some(Box::new(move || -> BoxFuture<'a, ()> {
            Box::pin(callback())
        }));
        self
    }
}

impl<R> Default for AsyncTransactOptions<'_, R> {
    fn default() -> Self {
        Self {
            max_retries: None,
            on_commit: None,
            on_rollback: None,
        }
    }
}

impl<R> fmt::Debug for AsyncTransactOptions<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransactOptions")
            .field("max_retries", &self.max_retries)
            .field("on_commit", &self.on_commit.is_some())
            .field("on_rollback", &self.on_rollback.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Counters {
    commits: AtomicU64,
    rollbacks: AtomicU64,
    migrations_applied: AtomicU64,
    migrations_skipped: AtomicU64,
}

/// What a single migration attempt decided.
enum MigrationStep {
    Skipped,
    Applied,
}

/// The JSON state store.
///
/// Holds one immutable snapshot of the state. Transactions and migrations
/// work on private copies and replace the snapshot only if no other commit
/// happened in the meantime; otherwise they run again on fresh data.
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Committed state. Compared by identity, never by content.
    current: Mutex<Arc<Value>>,

    /// Hook sets, fixed at construction.
    pipeline: Pipeline,

    /// Attached file persistence.
    persistence: Option<FileStore>,

    /// Last handed-out migration id.
    migration_counter: AtomicU64,

    counters: Counters,
}

impl Store {
    /// Create an in-memory store without hooks.
    pub fn new(initial: Value) -> Self {
        Self::with_hooks(initial, Vec::new())
    }

    /// Create an in-memory store with hook sets.
    pub fn with_hooks(initial: Value, hooks: Vec<HookSet>) -> Self {
        Self::build(StoreConfig::default(), initial, hooks)
    }

    /// Open a store.
    ///
    /// If `config.persist_path` is set and the file exists, its contents
    /// replace `initial`.
    pub fn open(config: StoreConfig, initial: Value, hooks: Vec<HookSet>) -> Result<Self> {
        let initial = match &config.persist_path {
            Some(path) => FileStore::new(path).load()?.unwrap_or(initial),
            None => initial,
        };
        Ok(Self::build(config, initial, hooks))
    }

    /// Asynchronous counterpart of [`Store::open`].
    pub async fn open_async(
        config: StoreConfig,
        initial: Value,
        hooks: Vec<HookSet>,
    ) -> Result<Self> {
        let initial = match &config.persist_path {
            Some(path) => FileStore::new(path).load_async().await?.unwrap_or(initial),
            None => initial,
        };
        Ok(Self::build(config, initial, hooks))
    }

    fn build(config: StoreConfig, initial: Value, hooks: Vec<HookSet>) -> Self {
        let persistence = config.persist_path.as_ref().map(FileStore::new);
        let migration_counter = AtomicU64::new(config.initial_migration_id.0);

        Self {
            config,
            current: Mutex::new(Arc::new(initial)),
            pipeline: Pipeline::new(hooks),
            persistence,
            migration_counter,
            counters: Counters::default(),
        }
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the attached persistence file.
    pub fn persist_path(&self) -> Option<&Path> {
        self.persistence.as_ref().map(FileStore::path)
    }

    /// Committed state, without running any hooks.
    pub fn snapshot(&self) -> Arc<Value> {
        Arc::clone(&self.current.lock())
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.counters.commits.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
            migrations_applied: self.counters.migrations_applied.load(Ordering::Relaxed),
            migrations_skipped: self.counters.migrations_skipped.load(Ordering::Relaxed),
        }
    }

    /// Migration records of the committed state.
    pub fn migration_history(&self) -> Result<Vec<MigrationRecord>> {
        migrations::history(&self.snapshot())
    }

    /// Highest migration id recorded in the committed state.
    pub fn last_migration_id(&self) -> MigrationId {
        migrations::last_applied(&self.snapshot())
    }

    fn ensure_sync(&self, operation: &'static str) -> Result<()> {
        if self.config.async_only {
            return Err(StoreError::AsyncOnly(operation));
        }
        Ok(())
    }

    // --- Reads ---

    /// Project `spec` out of the state, after the get hooks.
    pub fn get(&self, spec: &ProjectionSpec) -> Result<WorkingView> {
        self.ensure_sync("get")?;

        let snapshot = self.snapshot();
        if !self.pipeline.has_hooks(Lifecycle::Get) {
            return Ok(project(&snapshot, spec));
        }

        let operation = Operation::Get {
            spec: Arc::new(spec.clone()),
        };
        let (state, _) = self.pipeline.run_before(&operation, (*snapshot).clone())?;
        Ok(project(&state, spec))
    }

    /// Asynchronous counterpart of [`Store::get`].
    pub async fn get_async(&self, spec: &ProjectionSpec) -> Result<WorkingView> {
        let snapshot = self.snapshot();
        if !self.pipeline.has_hooks(Lifecycle::Get) {
            return Ok(project(&snapshot, spec));
        }

        let operation = Operation::Get {
            spec: Arc::new(spec.clone()),
        };
        let (state, _) = self
            .pipeline
            .run_before_async(&operation, (*snapshot).clone())
            .await?;
        Ok(project(&state, spec))
    }

    /// Full state, after the export hooks.
    pub fn export_state(&self) -> Result<Value> {
        self.ensure_sync("export_state")?;

        let (state, _) = self
            .pipeline
            .run_before(&Operation::Export, (*self.snapshot()).clone())?;
        Ok(state)
    }

    /// Asynchronous counterpart of [`Store::export_state`].
    pub async fn export_state_async(&self) -> Result<Value> {
        let (state, _) = self
            .pipeline
            .run_before_async(&Operation::Export, (*self.snapshot()).clone())
            .await?;
        Ok(state)
    }

    // --- Commits ---

    /// Swap in `candidate` if the committed state is still `initial`.
    ///
    /// Persistence and commit hooks run under the lock, before the swap, so
    /// a failed write leaves the store unchanged.
    fn try_commit(
        &self,
        operation: &Operation,
        initial: &Arc<Value>,
        candidate: Value,
    ) -> Result<bool> {
        let mut current = self.current.lock();

        if !Arc::ptr_eq(&current, initial) {
            self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("state changed during transaction, rolling back");
            return Ok(false);
        }

        if let Some(persistence) = &self.persistence {
            persistence.save(&candidate)?;
        }
        self.pipeline.run_commit(operation, &candidate)?;

        *current = Arc::new(candidate);
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Fail once `conflicts` exceeds the retry ceiling.
    fn check_retries(&self, conflicts: u32, ceiling: Option<u32>) -> Result<()> {
        match ceiling {
            Some(limit) if conflicts > limit => {
                tracing::warn!(limit, "transaction retries exhausted");
                Err(StoreError::RetriesExceeded(limit))
            }
            _ => Ok(()),
        }
    }

    /// Run `body` against a draft of the projected bindings and commit the
    /// result.
    ///
    /// `body` runs again on fresh data whenever another commit lands while
    /// it is in flight. If it fails, nothing is committed and its error is
    /// returned as is.
    pub fn transact<R, E, F>(&self, spec: &ProjectionSpec, body: F) -> std::result::Result<R, E>
    where
        F: FnMut(&mut Draft) -> std::result::Result<R, E>,
        E: From<StoreError>,
    {
        self.transact_with(spec, TransactOptions::default(), body)
    }

    /// [`Store::transact`] with per-call retry ceiling and callbacks.
    pub fn transact_with<R, E, F>(
        &self,
        spec: &ProjectionSpec,
        mut options: TransactOptions<'_, R>,
        mut body: F,
    ) -> std::result::Result<R, E>
    where
        F: FnMut(&mut Draft) -> std::result::Result<R, E>,
        E: From<StoreError>,
    {
        self.ensure_sync("transact")?;

        let ceiling = options.max_retries.or(self.config.max_retries);
        let operation = Operation::Transact {
            spec: Arc::new(spec.clone()),
        };
        let mut conflicts = 0;

        loop {
            let initial = self.snapshot();

            let (state, pairing) = self.pipeline.run_before(&operation, (*initial).clone())?;
            let (state, result) = transaction::run(state, spec, &mut body)?;
            let state = self
                .pipeline
                .run_after(&operation, &pairing, &initial, state)?;

            if self.try_commit(&operation, &initial, state)? {
                tracing::debug!(bindings = spec.len(), "committed transaction");
                if let Some(on_commit) = options.on_commit.as_mut() {
                    on_commit(&result);
                }
                return Ok(result);
            }

            if let Some(on_rollback) = options.on_rollback.as_mut() {
                on_rollback();
            }
            conflicts += 1;
            self.check_retries(conflicts, ceiling)?;
        }
    }

    /// Asynchronous counterpart of [`Store::transact`]. The body receives a
    /// cloneable draft handle and may await freely.
    pub async fn transact_async<R, E, F, Fut>(
        &self,
        spec: &ProjectionSpec,
        body: F,
    ) -> std::result::Result<R, E>
    where
        F: FnMut(SharedDraft) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: From<StoreError>,
    {
        self.transact_async_with(spec, AsyncTransactOptions::default(), body)
            .await
    }

    /// [`Store::transact_async`] with per-call retry ceiling and callbacks.
    pub async fn transact_async_with<R, E, F, Fut>(
        &self,
        spec: &ProjectionSpec,
        mut options: AsyncTransactOptions<'_, R>,
        mut body: F,
    ) -> std::result::Result<R, E>
    where
        F: FnMut(SharedDraft) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: From<StoreError>,
    {
        let ceiling = options.max_retries.or(self.config.max_retries);
        let operation = Operation::Transact {
            spec: Arc::new(spec.clone()),
        };
        let mut conflicts = 0;

        loop {
            let initial = self.snapshot();

            let (state, pairing) = self
                .pipeline
                .run_before_async(&operation, (*initial).clone())
                .await?;
            let (state, result) = transaction::run_async(state, spec, &mut body).await?;
            let state = self
                .pipeline
                .run_after_async(&operation, &pairing, &initial, state)
                .await?;

            if self.try_commit(&operation, &initial, state)? {
                tracing::debug!(bindings = spec.len(), "committed transaction");
                if let Some(on_commit) = options.on_commit.as_mut() {
                    on_commit(&result).await;
                }
                return Ok(result);
            }

            if let Some(on_rollback) = options.on_rollback.as_mut() {
                on_rollback().await;
            }
            conflicts += 1;
            self.check_retries(conflicts, ceiling)?;
        }
    }

    // --- Migrations ---

    fn next_migration_id(&self) -> MigrationId {
        MigrationId(self.migration_counter.fetch_add(1, Ordering::SeqCst)).next()
    }

    fn record_step(&self, id: MigrationId, title: &str, step: &MigrationStep) {
        match step {
            MigrationStep::Skipped => {
                self.counters.migrations_skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%id, title, "skipped migration");
            }
            MigrationStep::Applied => {
                self.counters.migrations_applied.fetch_add(1, Ordering::Relaxed);
                tracing::info!(%id, title, "applied migration");
            }
        }
    }

    /// Apply `transform` once, under the next migration id.
    ///
    /// Skipped when the state already records that id or a later one. The
    /// transform receives a private copy of the state and must return a
    /// JSON object; the history record is attached to it. On failure the
    /// state is untouched and the id is not reused.
    pub fn migrate<E, F>(&self, title: &str, transform: F) -> std::result::Result<&Self, E>
    where
        F: FnMut(Value) -> std::result::Result<Value, E>,
        E: From<StoreError>,
    {
        self.ensure_sync("migrate")?;

        let id = self.next_migration_id();
        match self.migrate_inner(id, title, transform) {
            Ok(step) => {
                self.record_step(id, title, &step);
                Ok(self)
            }
            Err(e) => {
                tracing::error!(%id, title, "error while applying migration");
                Err(e)
            }
        }
    }

    fn migrate_inner<E, F>(
        &self,
        id: MigrationId,
        title: &str,
        mut transform: F,
    ) -> std::result::Result<MigrationStep, E>
    where
        F: FnMut(Value) -> std::result::Result<Value, E>,
        E: From<StoreError>,
    {
        let operation = Operation::Migrate {
            id,
            title: Arc::from(title),
        };
        let mut conflicts = 0;

        loop {
            let initial = self.snapshot();

            let (state, pairing) = self.pipeline.run_before(&operation, (*initial).clone())?;
            if migrations::last_applied(&state) >= id {
                return Ok(MigrationStep::Skipped);
            }

            let migrated = transform(state.clone())?;
            let migrated = migrations::seal(id, title, &state, migrated)?;
            let migrated = self
                .pipeline
                .run_after(&operation, &pairing, &initial, migrated)?;

            if self.try_commit(&operation, &initial, migrated)? {
                return Ok(MigrationStep::Applied);
            }

            conflicts += 1;
            self.check_retries(conflicts, self.config.max_retries)?;
        }
    }

    /// Asynchronous counterpart of [`Store::migrate`].
    pub async fn migrate_async<E, F, Fut>(
        &self,
        title: &str,
        transform: F,
    ) -> std::result::Result<&Self, E>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: From<StoreError>,
    {
        let id = self.next_migration_id();
        match self.migrate_async_inner(id, title, transform).await {
            Ok(step) => {
                self.record_step(id, title, &step);
                Ok(self)
            }
            Err(e) => {
                tracing::error!(%id, title, "error while applying migration");
                Err(e)
            }
        }
    }

    async fn migrate_async_inner<E, F, Fut>(
        &self,
        id: MigrationId,
        title: &str,
        mut transform: F,
    ) -> std::result::Result<MigrationStep, E>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: From<StoreError>,
    {
        let operation = Operation::Migrate {
            id,
            title: Arc::from(title),
        };
        let mut conflicts = 0;

        loop {
            let initial = self.snapshot();

            let (state, pairing) = self
                .pipeline
                .run_before_async(&operation, (*initial).clone())
                .await?;
            if migrations::last_applied(&state) >= id {
                return Ok(MigrationStep::Skipped);
            }

            let migrated = transform(state.clone()).await?;
            let migrated = migrations::seal(id, title, &state, migrated)?;
            let migrated = self
                .pipeline
                .run_after_async(&operation, &pairing, &initial, migrated)
                .await?;

            if self.try_commit(&operation, &initial, migrated)? {
                return Ok(MigrationStep::Applied);
            }

            conflicts += 1;
            self.check_retries(conflicts, self.config.max_retries)?;
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
