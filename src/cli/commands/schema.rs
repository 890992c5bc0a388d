//! Schema command implementation.
//!
//! Emits JSON Schema documents describing `tstore`'s machine-readable
//! outputs, so tooling can validate them without reading source code.

use crate::cli::{CommandContext, ErrorEnvelope};
use crate::error::Result;
use crate::model::{CleanupResult, MigrationPlan, StoreInfo, Task, TreeNode};
use chrono::{DateTime, Utc};
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct SchemaOutput {
    tool: &'static str,
    generated_at: DateTime<Utc>,
    schemas: BTreeMap<&'static str, RootSchema>,
}

/// Print the schemas. Output is JSON with or without `--json`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn execute(_ctx: &CommandContext) -> Result<()> {
    let payload = SchemaOutput {
        tool: "tstore",
        generated_at: Utc::now(),
        schemas: build_schemas(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn build_schemas() -> BTreeMap<&'static str, RootSchema> {
    let mut schemas = BTreeMap::new();
    schemas.insert("MigrationPlan", schema_for!(MigrationPlan));
    schemas.insert("StoreInfo", schema_for!(StoreInfo));
    schemas.insert("CleanupResult", schema_for!(CleanupResult));
    schemas.insert("Task", schema_for!(Task));
    schemas.insert("TreeNode", schema_for!(TreeNode));
    schemas.insert("ErrorEnvelope", schema_for!(ErrorEnvelope));
    schemas
}
