//! Stale command implementation.

use crate::cli::{CommandContext, StaleArgs};
use crate::error::Result;
use crate::model::Status;
use chrono::Utc;
use tracing::info;

/// List tasks not updated within `--days`.
///
/// # Errors
///
/// Returns an error for an unknown `--status`, or if the query fails.
pub fn execute(args: &StaleArgs, ctx: &CommandContext) -> Result<()> {
    let statuses = args
        .statuses
        .iter()
        .map(|s| s.parse::<Status>())
        .collect::<Result<Vec<_>>>()?;

    let storage = ctx.open()?;
    let cutoff = super::days_before(Utc::now(), args.days, "days")?;
    let tasks = storage.get_stale_tasks(cutoff, &statuses, args.limit)?;
    info!(count = tasks.len(), days = args.days, "Found stale tasks");

    ctx.emit(&tasks, |tasks| {
        super::ready::print_tasks(tasks, "No stale tasks.");
    })
}
