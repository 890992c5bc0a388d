//! `tstore` subcommand implementations.

pub mod cleanup;
pub mod info;
pub mod init;
pub mod migrate;
pub mod ready;
pub mod schema;
pub mod stale;
pub mod tree;

use crate::error::{Result, StoreError};
use chrono::{DateTime, Duration, Utc};

/// `now` minus `days`, rejecting spans the clock cannot represent.
pub(crate) fn days_before(
    now: DateTime<Utc>,
    days: u32,
    field: &'static str,
) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| StoreError::validation(field, format!("{days} days is out of range")))
}
