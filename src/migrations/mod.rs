//! Migration history kept inside the state.
//!
//! Applied migrations are recorded append-only in an array under
//! [`HISTORY_KEY`]. The store decides whether a migration runs by
//! comparing its candidate id against [`last_applied`].

use crate::error::{Result, StoreError};
use crate::types::{MigrationId, MigrationRecord};
use serde_json::Value;

/// Reserved top-level key holding the migration history.
pub const HISTORY_KEY: &str = "__migrationHistory";

fn entries(state: &Value) -> &[Value] {
    state
        .get(HISTORY_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Highest recorded migration id, `MigrationId(0)` when none is recorded.
///
/// Entries without a numeric id are ignored.
pub fn last_applied(state: &Value) -> MigrationId {
    entries(state)
        .iter()
        .filter_map(|entry| entry.get("id").and_then(Value::as_u64))
        .max()
        .map(MigrationId)
        .unwrap_or_default()
}

/// Decode the recorded history.
pub fn history(state: &Value) -> Result<Vec<MigrationRecord>> {
    entries(state)
        .iter()
        .map(|entry| {
            serde_json::from_value(entry.clone())
                .map_err(|e| StoreError::Deserialization(e.to_string()))
        })
        .collect()
}

/// Attach the history to a migration's output.
///
/// The output keeps its own members; its history becomes `prior` followed
/// by a new record for `id`. Outputs that are not JSON objects are
/// rejected.
pub fn seal(id: MigrationId, title: &str, prior: &Value, migrated: Value) -> Result<Value> {
    let Value::Object(mut members) = migrated else {
        return Err(StoreError::InvalidMigrationOutput {
            id,
            title: title.to_owned(),
        });
    };

    let mut history = entries(prior).to_vec();
    history.push(serde_json::to_value(MigrationRecord::now(id, title))?);
    members.insert(HISTORY_KEY.to_owned(), Value::Array(history));

    Ok(Value::Object(members))
}
