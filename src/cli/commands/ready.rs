//! Ready command implementation.
//!
//! Shows tasks ready to work on: actionable status, no actionable blocker.

use crate::cli::{CommandContext, ReadyArgs};
use crate::error::Result;
use crate::model::Task;
use crate::storage::ReadyFilter;
use tracing::{debug, info};

/// Execute the ready command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the query fails.
pub fn execute(args: &ReadyArgs, ctx: &CommandContext) -> Result<()> {
    let storage = ctx.open()?;

    let filter = ReadyFilter {
        assignee: args.assignee.clone(),
        unassigned: args.unassigned,
        limit: args.limit,
        ..ReadyFilter::default()
    };
    debug!(filter = ?filter, "Applied ready filter");

    let tasks = storage.get_ready_tasks(&filter)?;
    info!(count = tasks.len(), "Found ready tasks");

    ctx.emit(&tasks, |tasks| print_tasks(tasks, "No tasks ready to work on."))
}

pub(super) fn print_tasks(tasks: &[Task], empty: &str) {
    if tasks.is_empty() {
        println!("{empty}");
        return;
    }
    for task in tasks {
        let assignee = task
            .assignee
            .as_deref()
            .map(|a| format!(" @{a}"))
            .unwrap_or_default();
        println!(
            "{:<10} {} [{}] {:<11} {}{}",
            task.id, task.priority, task.task_type, task.status, task.title, assignee
        );
    }
}
