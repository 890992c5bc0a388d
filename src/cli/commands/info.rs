//! Info command implementation.

use crate::cli::CommandContext;
use crate::error::Result;
use crate::model::StoreInfo;

/// Print the schema version and task counts by status.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let storage = ctx.open()?;
    let info = storage.get_store_info()?;
    ctx.emit(&info, print_info)
}

fn print_info(info: &StoreInfo) {
    println!("Schema version: {}", info.schema_version);
    println!("Tasks: {}", info.total_tasks);
    for (status, count) in &info.task_counts {
        println!("  {status:<12} {count}");
    }
}
