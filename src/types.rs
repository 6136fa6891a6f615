//! Core types for the JSON store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an applied migration.
///
/// Ids start at 1; `MigrationId(0)` means "no migration applied".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct MigrationId(pub u64);

impl MigrationId {
    pub fn next(self) -> Self {
        MigrationId(self.0 + 1)
    }
}

impl fmt::Debug for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MigrationId({})", self.0)
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the migration history kept inside the state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: MigrationId,
    pub title: String,
    #[serde(rename = "appliedAt")]
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Record stamped with the current time.
    pub fn now(id: MigrationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful commits (transactions and migrations).
    pub commits: u64,
    /// Candidates discarded because another commit won the race.
    pub rollbacks: u64,
    pub migrations_applied: u64,
    pub migrations_skipped: u64,
}
