//! `tstore` binary entry point.

use clap::Parser;
use std::process::ExitCode;
use taskstore::cli::{self, Cli};
use taskstore::logging::init_logging;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Error: failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match cli::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            let code = cli::report_error(&err, cli.json);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
