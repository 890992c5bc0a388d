//! Database schema definitions and migration logic.
//!
//! The schema evolves through an ordered list of additive migrations. Each
//! migration runs in its own transaction together with its bookkeeping row
//! in `schema_migrations`, so a crash leaves the database at the last fully
//! applied version.
//!
//! Databases created before the bookkeeping table existed ("pre-migration"
//! databases) are detected by the presence of a `tasks` table with no
//! bookkeeping rows, and are stamped at version 1 before anything runs.

use crate::error::{Result, StoreError};
use crate::model::{MigrationPlan, PendingMigration};
use crate::util::time::format_ts;
use chrono::Utc;
use rusqlite::Connection;
use std::time::Duration;
use tracing::{debug, info};

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Version 1: tasks, labels, dependency edges and the full-text index.
const V1_TASKS: &str = r"
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL CHECK(length(title) <= 500),
        description TEXT NOT NULL DEFAULT '',
        notes TEXT NOT NULL DEFAULT '',
        design TEXT NOT NULL DEFAULT '',
        acceptance_criteria TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'open',
        type TEXT NOT NULL DEFAULT 'task',
        priority INTEGER NOT NULL DEFAULT 2 CHECK(priority >= 0 AND priority <= 4),
        spec_id TEXT,
        parent_id TEXT,
        assignee TEXT,
        source_repo TEXT,
        custom TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
    CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);
    CREATE INDEX IF NOT EXISTS idx_tasks_type ON tasks(type);
    CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee) WHERE assignee IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id) WHERE parent_id IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
    CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks(updated_at);

    CREATE TABLE IF NOT EXISTS labels (
        task_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (task_id, label),
        FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_labels_label ON labels(label);

    -- Edges reference tasks that may be created later in the same batch,
    -- so the foreign keys are checked at commit.
    CREATE TABLE IF NOT EXISTS dependencies (
        child_id TEXT NOT NULL,
        parent_id TEXT NOT NULL,
        type TEXT NOT NULL DEFAULT 'blocks',
        created_at TEXT NOT NULL,
        PRIMARY KEY (child_id, parent_id, type),
        FOREIGN KEY (child_id) REFERENCES tasks(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
        FOREIGN KEY (parent_id) REFERENCES tasks(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
    );

    CREATE INDEX IF NOT EXISTS idx_dependencies_parent ON dependencies(parent_id, type);

    CREATE VIRTUAL TABLE IF NOT EXISTS tasks_fts USING fts5(
        title,
        description,
        notes,
        content='tasks',
        content_rowid='rowid'
    );

    CREATE TRIGGER IF NOT EXISTS tasks_fts_insert AFTER INSERT ON tasks BEGIN
        INSERT INTO tasks_fts(rowid, title, description, notes)
        VALUES (NEW.rowid, NEW.title, NEW.description, NEW.notes);
    END;

    CREATE TRIGGER IF NOT EXISTS tasks_fts_delete AFTER DELETE ON tasks BEGIN
        INSERT INTO tasks_fts(tasks_fts, rowid, title, description, notes)
        VALUES ('delete', OLD.rowid, OLD.title, OLD.description, OLD.notes);
    END;

    CREATE TRIGGER IF NOT EXISTS tasks_fts_update AFTER UPDATE ON tasks BEGIN
        INSERT INTO tasks_fts(tasks_fts, rowid, title, description, notes)
        VALUES ('delete', OLD.rowid, OLD.title, OLD.description, OLD.notes);
        INSERT INTO tasks_fts(rowid, title, description, notes)
        VALUES (NEW.rowid, NEW.title, NEW.description, NEW.notes);
    END;
";

/// Version 2: content-addressed blobs and task attachments.
const V2_ATTACHMENTS: &str = r"
    CREATE TABLE IF NOT EXISTS blobs (
        id TEXT PRIMARY KEY,
        sha256 TEXT NOT NULL UNIQUE,
        size_bytes INTEGER NOT NULL CHECK(size_bytes >= 0),
        storage_backend TEXT NOT NULL,
        blob_key TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_blobs_created_at ON blobs(created_at);

    CREATE TABLE IF NOT EXISTS attachments (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'other'
            CHECK(kind IN ('spec', 'diagram', 'artifact', 'diagnostic', 'archive', 'other')),
        source_type TEXT NOT NULL
            CHECK(source_type IN ('managed_blob', 'external_url', 'repo_path')),
        title TEXT,
        filename TEXT,
        media_type TEXT,
        media_type_source TEXT NOT NULL DEFAULT 'unknown'
            CHECK(media_type_source IN ('sniffed', 'declared', 'inferred', 'unknown')),
        blob_id TEXT,
        external_url TEXT,
        repo_path TEXT,
        meta TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        expires_at TEXT,
        FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
        FOREIGN KEY (blob_id) REFERENCES blobs(id)
    );

    CREATE INDEX IF NOT EXISTS idx_attachments_task ON attachments(task_id);
    CREATE INDEX IF NOT EXISTS idx_attachments_blob ON attachments(blob_id) WHERE blob_id IS NOT NULL;

    CREATE TABLE IF NOT EXISTS attachment_labels (
        attachment_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (attachment_id, label),
        FOREIGN KEY (attachment_id) REFERENCES attachments(id) ON DELETE CASCADE
    );
";

/// Version 3: git repositories and task references to git objects.
const V3_GIT_REFS: &str = r"
    CREATE TABLE IF NOT EXISTS git_repos (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        default_branch TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS task_git_refs (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL,
        repo_id TEXT NOT NULL,
        relation TEXT NOT NULL,
        object_type TEXT NOT NULL
            CHECK(object_type IN ('commit', 'tag', 'branch', 'path', 'blob', 'tree')),
        object_value TEXT NOT NULL,
        resolved_commit TEXT,
        note TEXT,
        meta TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
        FOREIGN KEY (repo_id) REFERENCES git_repos(id) ON DELETE CASCADE
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_task_git_refs_unique ON task_git_refs(
        task_id, repo_id, relation, object_type, object_value, COALESCE(resolved_commit, '')
    );
    CREATE INDEX IF NOT EXISTS idx_task_git_refs_task ON task_git_refs(task_id);
";

/// Version 4: opaque users and sessions for the credential layer.
const V4_CREDENTIALS: &str = r"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT,
        password_hash TEXT NOT NULL,
        disabled_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        revoked_at TEXT,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
";

/// All known migrations, ascending by version.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "tasks, labels, dependencies and full-text index",
        sql: V1_TASKS,
    },
    Migration {
        version: 2,
        description: "blobs and attachments",
        sql: V2_ATTACHMENTS,
    },
    Migration {
        version: 3,
        description: "git repositories and task git references",
        sql: V3_GIT_REFS,
    },
    Migration {
        version: 4,
        description: "users and sessions",
        sql: V4_CREDENTIALS,
    },
];

/// Highest version this build knows about.
#[must_use]
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Apply connection-level settings.
///
/// Must run outside a transaction: `journal_mode` and `foreign_keys` are
/// ignored inside one.
///
/// # Errors
///
/// Returns an error if a pragma cannot be set.
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    // Single writer, many readers.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // NORMAL synchronous is safe with WAL: committed data survives OS crash
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

/// Bring the schema up to [`latest_version`].
///
/// Returns the versions applied by this call (empty when already current).
///
/// # Errors
///
/// Returns [`StoreError::Migration`] naming the failed version. Earlier
/// versions applied by this call stay committed.
pub fn apply_migrations(conn: &mut Connection) -> Result<Vec<i64>> {
    apply_migration_list(conn, MIGRATIONS)
}

fn apply_migration_list(conn: &mut Connection, migrations: &[Migration]) -> Result<Vec<i64>> {
    prepare_bookkeeping(conn)?;
    let current = current_version(conn)?;
    let mut applied = Vec::new();

    for migration in migrations.iter().filter(|m| m.version > current) {
        debug!(version = migration.version, "Applying migration");
        run_migration(conn, migration).map_err(|source| StoreError::Migration {
            version: migration.version,
            description: migration.description.to_string(),
            source,
        })?;
        info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
        applied.push(migration.version);
    }

    if !applied.is_empty() {
        conn.pragma_update(None, "user_version", current_version(conn)?)?;
    }

    Ok(applied)
}

fn run_migration(conn: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![migration.version, format_ts(&Utc::now())],
    )?;
    tx.commit()
}

/// Report the current and pending versions without applying anything.
///
/// Creating the bookkeeping table and stamping a pre-migration database are
/// the only writes, and both are idempotent.
///
/// # Errors
///
/// Returns an error if the bookkeeping table cannot be read or created.
pub fn plan_migrations(conn: &Connection) -> Result<MigrationPlan> {
    prepare_bookkeeping(conn)?;
    let current = current_version(conn)?;
    let pending = MIGRATIONS
        .iter()
        .filter(|m| m.version > current)
        .map(|m| PendingMigration {
            version: m.version,
            description: m.description.to_string(),
        })
        .collect();

    Ok(MigrationPlan {
        current_version: current,
        available_version: latest_version(),
        pending,
    })
}

/// Highest applied version, 0 for an empty database.
///
/// # Errors
///
/// Returns an error if the bookkeeping table cannot be read.
pub fn current_version(conn: &Connection) -> Result<i64> {
    if !table_exists(conn, "schema_migrations")? {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

fn prepare_bookkeeping(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )?;

    if is_pre_migration(conn)? {
        info!("Detected pre-migration database, stamping version 1");
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (1, ?)",
            [format_ts(&Utc::now())],
        )?;
    }
    Ok(())
}

fn is_pre_migration(conn: &Connection) -> Result<bool> {
    if !table_exists(conn, "tasks")? {
        return Ok(false);
    }
    let rows: i64 = conn.query_row("SELECT count(*) FROM schema_migrations", [], |row| {
        row.get(0)
    })?;
    Ok(rows == 0)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?")?;
    Ok(stmt.exists([table])?)
}
