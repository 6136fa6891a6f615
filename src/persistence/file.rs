//! File-backed state storage.

use crate::error::{Result, StoreError};
use crate::middleware::{BeforeContext, HookSet, Lifecycle};
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Reads and writes the whole state as one JSON document.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

fn parse(contents: &str) -> Result<Value> {
    serde_json::from_str(contents).map_err(|e| StoreError::Deserialization(e.to_string()))
}

fn not_found<T>(result: io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state. `None` if the file does not exist.
    pub fn load(&self) -> Result<Option<Value>> {
        not_found(fs::read_to_string(&self.path))?
            .map(|contents| parse(&contents))
            .transpose()
    }

    pub async fn load_async(&self) -> Result<Option<Value>> {
        not_found(tokio::fs::read_to_string(&self.path).await)?
            .map(|contents| parse(&contents))
            .transpose()
    }

    /// Overwrite the file with `state`.
    pub fn save(&self, state: &Value) -> Result<()> {
        let contents = serde_json::to_vec(state)?;

        let mut file = fs::File::create(&self.path)?;
        file.write_all(&contents)?;
        file.sync_all()?;

        Ok(())
    }

    /// Hook set that reloads the file before every operation and writes
    /// the state each transaction or migration commits.
    ///
    /// A missing file leaves the incoming state unchanged. Writes happen in
    /// the commit stage, so attempts that lose the identity check never
    /// reach the file.
    pub fn hooks(&self) -> HookSet {
        let mut hooks = HookSet::new(format!("file:{}", self.path.display()));

        for lifecycle in [
            Lifecycle::Transact,
            Lifecycle::Migrate,
            Lifecycle::Get,
            Lifecycle::Export,
        ] {
            let store = self.clone();
            hooks = hooks.before(lifecycle, move |ctx: BeforeContext| {
                Ok(store.load()?.unwrap_or(ctx.state))
            });

            let store = self.clone();
            hooks = hooks.before_async(lifecycle, move |ctx: BeforeContext| {
                let store = store.clone();
                async move {
                    let loaded = store.load_async().await?;
                    Ok::<_, StoreError>(loaded.unwrap_or(ctx.state))
                }
            });

            if lifecycle.has_after() {
                let store = self.clone();
                hooks = hooks.on_commit(lifecycle, move |_, state| store.save(state));
            }
        }

        hooks
    }
}
