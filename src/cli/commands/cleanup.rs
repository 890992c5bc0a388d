//! Cleanup command implementation.

use crate::cli::{CleanupArgs, CommandContext};
use crate::error::Result;
use crate::model::CleanupResult;
use chrono::Utc;

/// Delete (or with `--dry-run`, list) closed tasks older than the cutoff.
///
/// # Errors
///
/// Returns a validation error for a span the clock cannot represent, or an
/// error if the store cannot be opened or the delete fails.
pub fn execute(args: &CleanupArgs, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let cutoff = super::days_before(Utc::now(), args.older_than_days, "older_than_days")?;
    let result = storage.cleanup_closed_tasks(cutoff, args.dry_run)?;
    ctx.emit(&result, print_result)
}

fn print_result(result: &CleanupResult) {
    let verb = if result.dry_run { "Would delete" } else { "Deleted" };
    println!(
        "{verb} {} closed task{}",
        result.count,
        if result.count == 1 { "" } else { "s" }
    );
    for id in &result.task_ids {
        println!("  {id}");
    }
}
