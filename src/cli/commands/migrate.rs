//! Migrate command implementation.
//!
//! Works on a raw connection so `--plan` can report without applying.

use crate::cli::{CommandContext, MigrateArgs};
use crate::config;
use crate::error::Result;
use crate::model::MigrationPlan;
use crate::storage::schema;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct MigrateOutput {
    applied: Vec<i64>,
    schema_version: i64,
}

/// Execute the migrate command.
///
/// # Errors
///
/// Returns an error if the store cannot be located or a migration fails.
pub fn execute(args: &MigrateArgs, ctx: &CommandContext) -> Result<()> {
    let paths = config::resolve_store_paths(ctx.db.as_ref())?;
    let options = config::load_options(&paths.store_dir)?;
    let mut conn = Connection::open(&paths.db_path)?;
    schema::configure_connection(&conn, options.busy_timeout)?;

    if args.plan {
        let plan = schema::plan_migrations(&conn)?;
        return ctx.emit(&plan, print_plan);
    }

    let applied = schema::apply_migrations(&mut conn)?;
    let output = MigrateOutput {
        schema_version: schema::current_version(&conn)?,
        applied,
    };
    info!(applied = ?output.applied, version = output.schema_version, "Migrations complete");

    ctx.emit(&output, |out| {
        if out.applied.is_empty() {
            println!("Schema is up to date (version {}).", out.schema_version);
        } else {
            for version in &out.applied {
                println!("Applied migration {version}");
            }
            println!("Schema is now at version {}.", out.schema_version);
        }
    })
}

fn print_plan(plan: &MigrationPlan) {
    println!(
        "Current version: {}  Available: {}",
        plan.current_version, plan.available_version
    );
    if plan.is_current() {
        println!("No pending migrations.");
        return;
    }
    println!("Pending:");
    for pending in &plan.pending {
        println!("  {:>3}  {}", pending.version, pending.description);
    }
}
