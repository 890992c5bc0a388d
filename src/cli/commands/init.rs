//! Init command implementation.

use crate::cli::CommandContext;
use crate::config;
use crate::error::Result;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct InitOutput {
    store_dir: String,
    db_path: String,
    schema_version: i64,
}

/// Create `.taskstore/` in the current directory with a migrated database.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let (storage, paths) = config::init_store(&cwd)?;
    let output = InitOutput {
        store_dir: paths.store_dir.display().to_string(),
        db_path: paths.db_path.display().to_string(),
        schema_version: storage.schema_version()?,
    };
    info!(store = %output.store_dir, "Initialized store");

    ctx.emit(&output, |out| {
        println!("Initialized task store in {}", out.store_dir);
    })
}
