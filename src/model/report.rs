//! Report shapes consumed by operational tooling.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A migration that has not been applied yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PendingMigration {
    pub version: i64,
    pub description: String,
}

/// Where the schema is and where it would go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MigrationPlan {
    pub current_version: i64,
    pub available_version: i64,
    pub pending: Vec<PendingMigration>,
}

impl MigrationPlan {
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Summary of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoreInfo {
    pub schema_version: i64,
    /// Status name to count; statuses with no tasks are omitted.
    pub task_counts: BTreeMap<String, i64>,
    pub total_tasks: i64,
}

/// Outcome of a cleanup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupResult {
    pub task_ids: Vec<String>,
    pub count: usize,
    pub dry_run: bool,
}
