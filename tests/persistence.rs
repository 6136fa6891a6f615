//! File persistence tests.

use jsonstore::migrations::HISTORY_KEY;
use jsonstore::{FileStore, ProjectionSpec, Store, StoreConfig, StoreError};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn persisted(path: &Path) -> StoreConfig {
    StoreConfig {
        persist_path: Some(path.to_path_buf()),
        ..Default::default()
    }
}

fn read_file(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_missing_file_uses_initial_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.json");

    let store = Store::open(persisted(&path), json!({"field": 5}), Vec::new()).unwrap();

    assert_eq!(*store.snapshot(), json!({"field": 5}));
    assert!(!path.exists());
}

#[test]
fn test_commits_are_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.json");
    let store = Store::open(persisted(&path), json!({"field": 5}), Vec::new()).unwrap();

    store
        .transact(&ProjectionSpec::parse([("f", "field")]).unwrap(), |draft| {
            draft.set("f", json!(6));
            Ok::<_, StoreError>(())
        })
        .unwrap();

    assert_eq!(read_file(&path), json!({"field": 6}));
}

#[test]
fn test_migrations_are_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.json");
    let store = Store::open(persisted(&path), json!({"field": 5}), Vec::new()).unwrap();

    store
        .migrate("migration", |state| {
            Ok::<_, StoreError>(json!({"field2": state["field"].to_string()}))
        })
        .unwrap();

    let contents = read_file(&path);
    assert_eq!(contents["field2"], json!("5"));
    assert_eq!(contents[HISTORY_KEY].as_array().unwrap().len(), 1);

    // Reopening replays nothing.
    let reopened = Store::open(persisted(&path), json!({"field": 5}), Vec::new()).unwrap();
    reopened
        .migrate("migration", |_| -> Result<Value, StoreError> {
            panic!("already applied")
        })
        .unwrap();
    assert_eq!(reopened.export_state().unwrap(), contents);
}

#[test]
fn test_corrupt_file_fails_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.json");
    fs::write(&path, "not json at all").unwrap();

    let result = Store::open(persisted(&path), json!({}), Vec::new());
    assert!(matches!(result, Err(StoreError::Deserialization(_))));
}

#[test]
fn test_failed_write_keeps_previous_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.json");
    let store = Store::open(persisted(&path), json!({"field": 5}), Vec::new()).unwrap();

    // A directory in place of the file makes every write fail.
    fs::create_dir(&path).unwrap();

    let result = store.transact(&ProjectionSpec::parse([("f", "field")]).unwrap(), |draft| {
        draft.set("f", json!(6));
        Ok::<_, StoreError>(())
    });

    assert!(matches!(result, Err(StoreError::Io(_))));
    assert_eq!(*store.snapshot(), json!({"field": 5}));
    assert_eq!(store.stats().commits, 0);
}

#[tokio::test]
async fn test_open_async_and_async_commits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.json");
    fs::write(&path, r#"{"field": 1}"#).unwrap();

    let store = Store::open_async(persisted(&path), json!({"field": 0}), Vec::new())
        .await
        .unwrap();
    assert_eq!(*store.snapshot(), json!({"field": 1}));

    store
        .transact_async(&ProjectionSpec::parse([("f", "field")]).unwrap(), |draft| async move {
            draft.set("f", json!(2));
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();

    assert_eq!(read_file(&path), json!({"field": 2}));
}

#[test]
fn test_file_hooks_share_state_between_stores() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("shared.json"));

    let writer = Store::with_hooks(json!({"field": 5}), vec![file.hooks()]);
    let reader = Store::with_hooks(json!({"field": 0}), vec![file.hooks()]);

    // Nothing on disk yet: the reader sees its own state.
    assert_eq!(reader.export_state().unwrap(), json!({"field": 0}));

    writer
        .transact(&ProjectionSpec::parse([("f", "field")]).unwrap(), |draft| {
            draft.set("f", json!(6));
            Ok::<_, StoreError>(())
        })
        .unwrap();

    assert_eq!(file.load().unwrap(), Some(json!({"field": 6})));
    assert_eq!(reader.export_state().unwrap(), json!({"field": 6}));

    let view = reader
        .get(&ProjectionSpec::parse([("f", "field")]).unwrap())
        .unwrap();
    assert_eq!(view.get("f"), Some(&json!(6)));
}

#[tokio::test]
async fn test_file_hooks_async() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("shared.json"));
    let store = Store::with_hooks(json!({"list": []}), vec![file.hooks()]);

    store
        .transact_async(&ProjectionSpec::parse([("l", "list")]).unwrap(), |draft| async move {
            draft.update("l", |v| v.as_array_mut().unwrap().push(json!(1)));
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();

    assert_eq!(file.load_async().await.unwrap(), Some(json!({"list": [1]})));
}

#[test]
fn test_file_hooks_skip_attempts_that_roll_back() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::new(dir.path().join("shared.json"));
    let store = Store::with_hooks(json!({"field": 0}), vec![file.hooks()]);
    let spec = ProjectionSpec::parse([("f", "field")]).unwrap();
    let add = |amount: i64| {
        move |draft: &mut jsonstore::Draft| {
            draft.update("f", |v| *v = json!(v.as_i64().unwrap() + amount));
            Ok::<_, StoreError>(())
        }
    };

    let mut runs = 0;
    store
        .transact(&spec, |draft| {
            runs += 1;
            if runs == 1 {
                // Lands between this attempt's read and its commit.
                store.transact(&spec, add(10))?;
            }
            add(1)(draft)
        })
        .unwrap();

    assert_eq!(runs, 2);
    assert_eq!(*store.snapshot(), json!({"field": 11}));
    assert_eq!(file.load().unwrap(), Some(json!({"field": 11})));
    assert_eq!(store.stats().rollbacks, 1);
}
