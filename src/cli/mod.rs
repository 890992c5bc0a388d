//! Command-line interface for `tstore`.
//!
//! `tstore` is operational tooling around the store: migrations, health
//! reports, and the read-mostly queries an operator reaches for. Task
//! authoring belongs to the tracker that embeds this crate.

pub mod commands;

use crate::config;
use crate::error::{Result, StoreError};
use crate::storage::SqliteStorage;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tstore",
    about = "Inspect and maintain a taskstore database",
    version
)]
pub struct Cli {
    /// Database path (default: .taskstore/tasks.db, discovered upward)
    #[arg(long, global = true, env = "TASKSTORE_DB")]
    pub db: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also append JSON log lines to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .taskstore/ in the current directory
    Init,

    /// Apply pending schema migrations
    Migrate(MigrateArgs),

    /// Schema version and task counts by status
    Info,

    /// Tasks with no open blockers
    Ready(ReadyArgs),

    /// Tasks not updated recently
    Stale(StaleArgs),

    /// Dependency tree around one task
    Tree(TreeArgs),

    /// Delete old closed tasks
    Cleanup(CleanupArgs),

    /// JSON Schema of the report shapes
    Schema,
}

#[derive(Args, Debug, Default)]
pub struct MigrateArgs {
    /// Show pending migrations without applying them
    #[arg(long)]
    pub plan: bool,
}

#[derive(Args, Debug, Default)]
pub struct ReadyArgs {
    /// Only tasks assigned to this person
    #[arg(long)]
    pub assignee: Option<String>,

    /// Only unassigned tasks
    #[arg(long, conflicts_with = "assignee")]
    pub unassigned: bool,

    /// Maximum number of tasks
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StaleArgs {
    /// Minimum days since last update
    #[arg(long, default_value_t = 30)]
    pub days: u32,

    /// Restrict to these statuses (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<String>,

    /// Maximum number of tasks
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Task to start from
    pub id: String,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Delete closed tasks not updated for this many days
    #[arg(long)]
    pub older_than_days: u32,

    /// Report what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
}

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub db: Option<PathBuf>,
    pub json: bool,
}

impl CommandContext {
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            db: cli.db.clone(),
            json: cli.json,
        }
    }

    /// Open the store these options point at.
    ///
    /// # Errors
    ///
    /// Returns an error if no store can be located or opened.
    pub fn open(&self) -> Result<SqliteStorage> {
        let (storage, paths) = config::open_store(self.db.as_ref())?;
        tracing::debug!(db = %paths.db_path.display(), "Opened store");
        Ok(storage)
    }

    /// Print `value` as JSON, or run `human` for text output.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

/// Error envelope printed with `--json`.
#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct ErrorBody {
    /// Machine-readable error code (SCREAMING_SNAKE_CASE)
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn from_error(err: &StoreError) -> Self {
        Self {
            error: ErrorBody {
                code: err.code().as_str().to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Dispatch a parsed command line.
///
/// # Errors
///
/// Returns whatever the selected command returns.
pub fn run(cli: &Cli) -> Result<()> {
    let ctx = CommandContext::from_cli(cli);
    match &cli.command {
        Commands::Init => commands::init::execute(&ctx),
        Commands::Migrate(args) => commands::migrate::execute(args, &ctx),
        Commands::Info => commands::info::execute(&ctx),
        Commands::Ready(args) => commands::ready::execute(args, &ctx),
        Commands::Stale(args) => commands::stale::execute(args, &ctx),
        Commands::Tree(args) => commands::tree::execute(args, &ctx),
        Commands::Cleanup(args) => commands::cleanup::execute(args, &ctx),
        Commands::Schema => commands::schema::execute(&ctx),
    }
}

/// Print `err` the way `--json` asks for and return the exit code.
#[must_use]
pub fn report_error(err: &StoreError, json: bool) -> i32 {
    if json {
        match serde_json::to_string_pretty(&ErrorEnvelope::from_error(err)) {
            Ok(body) => eprintln!("{body}"),
            Err(_) => eprintln!("Error: {err}"),
        }
    } else {
        eprintln!("Error: {err}");
    }
    err.code().exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tstore", "ready", "--limit", "3", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ready(args) => assert_eq!(args.limit, Some(3)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn error_envelope_carries_code() {
        let err = StoreError::TaskNotFound { id: "ts-x".into() };
        let envelope = ErrorEnvelope::from_error(&err);
        assert_eq!(envelope.error.code, "NOT_FOUND");
        assert!(envelope.error.message.contains("ts-x"));
    }
}
