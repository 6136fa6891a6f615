//! Migration engine tests.

use jsonstore::migrations::HISTORY_KEY;
use jsonstore::{MigrationId, Store, StoreConfig, StoreError};
use serde_json::{json, Value};

fn field(state: &Value, name: &str) -> i64 {
    state[name].as_i64().unwrap()
}

#[test]
fn test_apply_migration() {
    let store = Store::new(json!({"field": 5}));
    store
        .migrate("migration", |state| {
            Ok::<_, StoreError>(json!({"field2": field(&state, "field").to_string()}))
        })
        .unwrap();

    let state = store.export_state().unwrap();
    assert_eq!(state["field2"], json!("5"));
    assert!(state.get("field").is_none());
    assert_eq!(state[HISTORY_KEY].as_array().unwrap().len(), 1);
}

#[test]
fn test_apply_multiple_migrations() {
    let store = Store::new(json!({"field": 5}));
    store
        .migrate("migration 1", |state| {
            Ok::<_, StoreError>(json!({"field2": field(&state, "field").to_string()}))
        })
        .unwrap()
        .migrate("migration 2", |state| {
            let parsed: i64 = state["field2"].as_str().unwrap().parse().unwrap();
            Ok::<_, StoreError>(json!({"field3": parsed}))
        })
        .unwrap()
        .migrate("migration 3", |state| {
            Ok::<_, StoreError>(json!({"field3": state["field3"].clone()}))
        })
        .unwrap();

    let state = store.export_state().unwrap();
    assert_eq!(state["field3"], json!(5));

    let history = store.migration_history().unwrap();
    let titles: Vec<_> = history.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["migration 1", "migration 2", "migration 3"]);
    let ids: Vec<_> = history.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![MigrationId(1), MigrationId(2), MigrationId(3)]);
}

#[test]
fn test_skip_already_applied_migrations() {
    let bump = |amount: i64| {
        move |state: Value| {
            let mut state = state;
            state["field"] = json!(field(&state, "field") + amount);
            Ok::<_, StoreError>(state)
        }
    };

    let first = Store::new(json!({"field": 5}));
    first.migrate("migration 1", bump(1)).unwrap();

    let second = Store::new(first.export_state().unwrap());
    second
        .migrate("migration 1", bump(1))
        .unwrap()
        .migrate("migration 2", bump(2))
        .unwrap();

    assert_eq!(field(&first.export_state().unwrap(), "field"), 6);
    assert_eq!(first.migration_history().unwrap().len(), 1);

    assert_eq!(field(&second.export_state().unwrap(), "field"), 8);
    assert_eq!(second.migration_history().unwrap().len(), 2);
    assert_eq!(second.stats().migrations_skipped, 1);
    assert_eq!(second.stats().migrations_applied, 1);
}

#[test]
fn test_replayed_migration_is_a_no_op() {
    let migrated = Store::new(json!({"a": 5}));
    migrated
        .migrate("t1", |mut state| {
            state["g"] = json!(6);
            Ok::<_, StoreError>(state)
        })
        .unwrap();
    let snapshot = migrated.export_state().unwrap();
    assert_eq!(snapshot["a"], json!(5));
    assert_eq!(snapshot["g"], json!(6));

    let replay = Store::new(snapshot.clone());
    replay
        .migrate("t1", |mut state| {
            state["g"] = json!(7);
            Ok::<_, StoreError>(state)
        })
        .unwrap();

    assert_eq!(replay.export_state().unwrap(), snapshot);
}

#[test]
fn test_broken_migration_stops_the_chain() {
    let store = Store::new(json!({"field": 5}));
    store
        .migrate("migration 1", |mut state| {
            state["field"] = json!(6);
            Ok::<_, StoreError>(state)
        })
        .unwrap()
        .migrate("migration 2", |mut state| {
            state["field"] = json!(8);
            Ok::<_, StoreError>(state)
        })
        .unwrap();

    let result = store
        .migrate("bad migration", |_| {
            Err::<Value, _>(StoreError::middleware("migration", "boom"))
        })
        .and_then(|store| {
            store.migrate("migration 4", |_| -> Result<Value, StoreError> {
                panic!("must not run after a failed migration")
            })
        });

    assert!(result.is_err());
    let state = store.export_state().unwrap();
    assert_eq!(field(&state, "field"), 8);
    assert_eq!(state[HISTORY_KEY].as_array().unwrap().len(), 2);
    assert_eq!(store.last_migration_id(), MigrationId(2));
}

#[test]
fn test_custom_error_type() {
    #[derive(Debug)]
    enum AppError {
        Store(StoreError),
        Invalid(&'static str),
    }

    impl From<StoreError> for AppError {
        fn from(e: StoreError) -> Self {
            AppError::Store(e)
        }
    }

    let store = Store::new(json!({"version": "one"}));
    let result = store.migrate("parse version", |state| {
        match state["version"].as_i64() {
            Some(v) => Ok(json!({"version": v})),
            None => Err(AppError::Invalid("version is not a number")),
        }
    });
    assert!(matches!(result, Err(AppError::Invalid(_))));

    let result = store.migrate("wrong shape", |_| Ok::<_, AppError>(json!("scalar")));
    assert!(matches!(
        result,
        Err(AppError::Store(StoreError::InvalidMigrationOutput { .. }))
    ));
}

#[tokio::test]
async fn test_async_migrations() {
    let store = Store::new(json!({"field": 1}));
    store
        .migrate_async("async 1", |mut state| async move {
            tokio::task::yield_now().await;
            state["field"] = json!(2);
            Ok::<_, StoreError>(state)
        })
        .await
        .unwrap();
    store
        .migrate("sync 2", |mut state| {
            state["field"] = json!(3);
            Ok::<_, StoreError>(state)
        })
        .unwrap();

    assert_eq!(field(&store.export_state_async().await.unwrap(), "field"), 3);
    assert_eq!(store.last_migration_id(), MigrationId(2));
}

#[test]
fn test_history_records_timestamps() {
    let store = Store::open(
        StoreConfig {
            initial_migration_id: MigrationId(9),
            ..Default::default()
        },
        json!({}),
        Vec::new(),
    )
    .unwrap();

    let before = chrono::Utc::now();
    store.migrate("tenth", Ok::<_, StoreError>).unwrap();
    let after = chrono::Utc::now();

    let history = store.migration_history().unwrap();
    assert_eq!(history[0].id, MigrationId(10));
    assert!(history[0].applied_at >= before && history[0].applied_at <= after);

    let raw = &store.snapshot()[HISTORY_KEY][0];
    assert!(raw["appliedAt"].is_string());
}
