//! Error types for `taskstore`.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors carry a
//! stable [`ErrorCode`] so the binary (and any embedding API layer) can map
//! them to exit codes or wire envelopes without string matching.

use rusqlite::ErrorCode as SqliteErrorCode;
use serde::Serialize;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required field is empty or holds a value outside its domain.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// A single named task does not exist.
    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    /// One or more named tasks do not exist; nothing was changed.
    #[error("tasks not found: {}", ids.join(", "))]
    TasksNotFound { ids: Vec<String> },

    /// Two tasks from different projects cannot be linked.
    #[error("cannot link {from} (project {from_project}) to {to} (project {to_project})")]
    ProjectMismatch {
        from: String,
        from_project: String,
        to: String,
        to_project: String,
    },

    /// Random ID generation kept colliding with existing rows.
    #[error("could not generate a unique '{prefix}' id after {attempts} attempts")]
    IdExhausted { prefix: String, attempts: usize },

    /// A schema migration failed and was rolled back.
    #[error("migration {version} ({description}) failed: {source}")]
    Migration {
        version: i64,
        description: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no .taskstore directory found (set TASKSTORE_DIR or pass --db)")]
    NotInitialized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a [`StoreError::Validation`].
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable classification of this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::TaskNotFound { .. } | Self::TasksNotFound { .. } => ErrorCode::NotFound,
            Self::ProjectMismatch { .. } => ErrorCode::Conflict,
            Self::IdExhausted { .. } => ErrorCode::IdExhausted,
            Self::Migration { .. } => ErrorCode::Migration,
            Self::Config(_) | Self::Yaml(_) | Self::NotInitialized => ErrorCode::Config,
            Self::Database(_) => ErrorCode::Database,
            Self::Json(_) => ErrorCode::Serialization,
            Self::Io(_) => ErrorCode::Io,
        }
    }

    /// True for the not-found sentinels.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::TaskNotFound { .. } | Self::TasksNotFound { .. })
    }

    /// True when the engine rejected a write because of a UNIQUE constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(err) => is_unique_violation(err),
            _ => false,
        }
    }
}

/// Returns true when `err` is a UNIQUE constraint failure.
///
/// Primary-key collisions report a different extended code and are not
/// considered duplicates.
#[must_use]
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => {
            inner.code == SqliteErrorCode::ConstraintViolation
                && inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

/// Stable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Conflict,
    IdExhausted,
    Migration,
    Config,
    Database,
    Serialization,
    Io,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::IdExhausted => "ID_EXHAUSTED",
            Self::Migration => "MIGRATION",
            Self::Config => "CONFIG",
            Self::Database => "DATABASE",
            Self::Serialization => "SERIALIZATION",
            Self::Io => "IO",
        }
    }

    /// Process exit code used by the `tstore` binary.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Validation => 2,
            Self::NotFound => 3,
            Self::Conflict => 4,
            Self::Config => 5,
            Self::Migration => 6,
            Self::IdExhausted | Self::Database | Self::Serialization | Self::Io => 1,
        }
    }
}
