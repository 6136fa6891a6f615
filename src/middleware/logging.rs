//! Hook set that reports store operations.
//!
//! Every hook passes its state through unchanged. By default entries go to
//! `tracing::info!`; [`logging_hooks_with_sink`] redirects them.

use crate::error::{Result, StoreError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::pipeline::HookSet;
use super::types::{AfterContext, BeforeContext, Operation};

/// Which lifecycles get logged.
#[derive(Clone, Debug)]
pub struct LoggingOptions {
    pub log_migrate: bool,
    pub log_transact: bool,
    pub log_get: bool,
    pub log_export: bool,
    /// Also log before hooks of transact and migrate.
    pub log_before_action: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_migrate: true,
            log_transact: true,
            log_get: true,
            log_export: true,
            log_before_action: false,
        }
    }
}

/// Hook that produced a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    BeforeTransact,
    BeforeTransactAsync,
    AfterTransact,
    AfterTransactAsync,
    BeforeMigrate,
    BeforeMigrateAsync,
    AfterMigrate,
    AfterMigrateAsync,
    Get,
    GetAsync,
    Export,
    ExportAsync,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::BeforeTransact => "beforeTransact",
            HookKind::BeforeTransactAsync => "beforeTransactAsync",
            HookKind::AfterTransact => "afterTransact",
            HookKind::AfterTransactAsync => "afterTransactAsync",
            HookKind::BeforeMigrate => "beforeMigrate",
            HookKind::BeforeMigrateAsync => "beforeMigrateAsync",
            HookKind::AfterMigrate => "afterMigrate",
            HookKind::AfterMigrateAsync => "afterMigrateAsync",
            HookKind::Get => "get",
            HookKind::GetAsync => "getAsync",
            HookKind::Export => "exportState",
            HookKind::ExportAsync => "exportStateAsync",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported hook invocation.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub hook: HookKind,
    pub message: String,
    pub operation: Operation,
    pub state_before: Value,
    /// Set for after hooks only.
    pub state_after: Option<Value>,
}

pub type LogSink = Arc<dyn Fn(LogEntry) + Send + Sync>;

fn describe(hook: HookKind, operation: &Operation) -> String {
    match operation {
        Operation::Transact { spec } | Operation::Get { spec } => {
            let spec = serde_json::to_string(spec.as_ref()).unwrap_or_default();
            format!("{}: {}", hook, spec)
        }
        Operation::Migrate { id, title } => format!("{}: {} - {}", hook, id, title),
        Operation::Export => format!("{} was called", hook),
    }
}

fn before_entry(hook: HookKind, ctx: &BeforeContext) -> LogEntry {
    LogEntry {
        hook,
        message: describe(hook, &ctx.operation),
        operation: ctx.operation.clone(),
        state_before: ctx.state.clone(),
        state_after: None,
    }
}

fn after_entry(hook: HookKind, ctx: &AfterContext) -> LogEntry {
    LogEntry {
        hook,
        message: describe(hook, &ctx.operation),
        operation: ctx.operation.clone(),
        state_before: (*ctx.state_before).clone(),
        state_after: Some(ctx.state_after.clone()),
    }
}

/// Logging hook set writing to `tracing`.
pub fn logging_hooks(options: LoggingOptions) -> HookSet {
    logging_hooks_with_sink(
        options,
        Arc::new(|entry: LogEntry| {
            tracing::info!(hook = %entry.hook, "{}", entry.message);
        }),
    )
}

/// Logging hook set handing each entry to `sink`.
pub fn logging_hooks_with_sink(options: LoggingOptions, sink: LogSink) -> HookSet {
    let before = |kind: HookKind| {
        let sink = Arc::clone(&sink);
        move |ctx: BeforeContext| -> Result<Value> {
            sink(before_entry(kind, &ctx));
            Ok(ctx.state)
        }
    };
    let before_async = |kind: HookKind| {
        let sink = Arc::clone(&sink);
        move |ctx: BeforeContext| {
            sink(before_entry(kind, &ctx));
            async move { Ok::<_, StoreError>(ctx.state) }
        }
    };
    let after = |kind: HookKind| {
        let sink = Arc::clone(&sink);
        move |ctx: AfterContext| -> Result<Value> {
            sink(after_entry(kind, &ctx));
            Ok(ctx.state_after)
        }
    };
    let after_async = |kind: HookKind| {
        let sink = Arc::clone(&sink);
        move |ctx: AfterContext| {
            sink(after_entry(kind, &ctx));
            async move { Ok::<_, StoreError>(ctx.state_after) }
        }
    };

    let mut hooks = HookSet::new("logging");

    if options.log_transact {
        if options.log_before_action {
            hooks = hooks
                .before_transact(before(HookKind::BeforeTransact))
                .before_transact_async(before_async(HookKind::BeforeTransactAsync));
        }
        hooks = hooks
            .after_transact(after(HookKind::AfterTransact))
            .after_transact_async(after_async(HookKind::AfterTransactAsync));
    }

    if options.log_migrate {
        if options.log_before_action {
            hooks = hooks
                .before_migrate(before(HookKind::BeforeMigrate))
                .before_migrate_async(before_async(HookKind::BeforeMigrateAsync));
        }
        hooks = hooks
            .after_migrate(after(HookKind::AfterMigrate))
            .after_migrate_async(after_async(HookKind::AfterMigrateAsync));
    }

    if options.log_get {
        hooks = hooks
            .on_get(before(HookKind::Get))
            .on_get_async(before_async(HookKind::GetAsync));
    }

    if options.log_export {
        hooks = hooks
            .on_export(before(HookKind::Export))
            .on_export_async(before_async(HookKind::ExportAsync));
    }

    hooks
}
