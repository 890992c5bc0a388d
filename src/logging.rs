//! Logging setup for the `tstore` binary and for tests.
//!
//! The storage layer only emits `tracing` events; installing a subscriber is
//! left to whoever embeds the crate. `RUST_LOG` always wins over the
//! verbosity flags.

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::{Mutex, Once};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber.
///
/// Human-readable events go to stderr. With `log_file`, every event is also
/// appended to that file as one JSON object per line.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log file cannot be
/// opened, or a global subscriber is already installed.
pub fn init_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbosity, quiet)))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0)
        .with_ansi(std::io::stderr().is_terminal());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .json();
            tracing::subscriber::set_global_default(subscriber.with(file_layer))?;
        }
        None => tracing::subscriber::set_global_default(subscriber)?,
    }

    Ok(())
}

/// Filter used when `RUST_LOG` is unset.
fn default_filter(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "taskstore=warn",
        1 => "taskstore=info",
        2 => "taskstore=debug",
        3 => "taskstore=trace",
        _ => "taskstore=trace,rusqlite=debug",
    }
}

/// Install a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("taskstore=debug")),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_verbosity() {
        assert_eq!(default_filter(3, true), "error");
    }

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_filter(0, false), "taskstore=warn");
        assert_eq!(default_filter(2, false), "taskstore=debug");
        assert!(default_filter(9, false).contains("rusqlite"));
    }

    #[test]
    fn filters_parse() {
        for verbosity in 0..5 {
            assert!(EnvFilter::try_new(default_filter(verbosity, false)).is_ok());
        }
    }
}
