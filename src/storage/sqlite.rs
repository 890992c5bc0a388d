//! `SQLite` storage implementation.
//!
//! [`SqliteStorage`] owns one connection. Single statements auto-commit;
//! anything touching more than one row set goes through [`SqliteStorage::mutate`],
//! which opens an immediate transaction that rolls back when dropped.
//!
//! The free functions in this module take a plain `&Connection` so the same
//! code runs inside `mutate`, inside an import transaction, or standalone.

use crate::config::StorageOptions;
use crate::error::{Result, StoreError};
use crate::model::{CleanupResult, Metadata, NewTask, Status, StoreInfo, Task, TaskUpdate};
use crate::storage::deps::insert_dependency;
use crate::storage::labels::insert_labels;
use crate::storage::schema;
use crate::util::id::generate_id_checked;
use crate::util::time::{format_opt_ts, format_ts, opt_ts_column, ts_column};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, InterruptHandle, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Column list for [`task_from_row`]; queries alias `tasks` as `t`.
pub(crate) const TASK_COLUMNS: &str = "t.id, t.title, t.status, t.type, t.priority, \
     t.description, t.notes, t.design, t.acceptance_criteria, \
     t.spec_id, t.parent_id, t.assignee, t.source_repo, t.custom, \
     t.created_at, t.updated_at, t.closed_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    pub(super) conn: Connection,
    pub(super) options: StorageOptions,
}

impl SqliteStorage {
    /// Open (and migrate) the database at `path` with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a
    /// migration fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_options(path, StorageOptions::default())
    }

    /// Open (and migrate) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a
    /// migration fails.
    pub fn open_with_options(path: &Path, options: StorageOptions) -> Result<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened database");
        Self::from_connection(conn, options)
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        Self::open_memory_with_options(StorageOptions::default())
    }

    /// Open an in-memory database with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory_with_options(options: StorageOptions) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, options)
    }

    fn from_connection(mut conn: Connection, options: StorageOptions) -> Result<Self> {
        schema::configure_connection(&conn, options.busy_timeout)?;
        let applied = schema::apply_migrations(&mut conn)?;
        if !applied.is_empty() {
            info!(versions = ?applied, "Schema migrated");
        }
        Ok(Self { conn, options })
    }

    /// Options this store was opened with.
    #[must_use]
    pub const fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Read access to the underlying connection for tooling and tests.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Handle that aborts the statement currently running on this store.
    ///
    /// An interrupted statement fails with an engine error and the enclosing
    /// transaction, if any, rolls back.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Run `f` inside one immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any error (from `f` or the commit)
    /// leaves the database untouched.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or the engine error from begin/commit.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction<'_>, &StorageOptions) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = match f(&tx, &self.options) {
            Ok(result) => result,
            Err(err) => {
                debug!(op, error = %err, "Rolling back transaction");
                return Err(err);
            }
        };

        tx.commit()?;
        debug!(op, "Committed transaction");
        Ok(result)
    }

    /// Current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the bookkeeping table cannot be read.
    pub fn schema_version(&self) -> Result<i64> {
        schema::current_version(&self.conn)
    }

    /// Create one task with its labels and blocking parents.
    ///
    /// An empty `task.id` is replaced by a generated id. Returns the id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input; any engine error (duplicate
    /// id, unknown dependency target) rolls back the whole task.
    pub fn create_task(&mut self, task: &Task, labels: &[String], deps: &[String]) -> Result<String> {
        self.mutate("create_task", |tx, options| {
            insert_task(tx, options, task, labels, deps)
        })
    }

    /// Create several tasks in one transaction. Nothing persists unless all do.
    ///
    /// Dependencies may reference tasks created later in the same batch.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the batch is rolled back.
    pub fn create_tasks(&mut self, batch: &[NewTask]) -> Result<Vec<String>> {
        self.mutate("create_tasks", |tx, options| {
            batch
                .iter()
                .map(|new| insert_task(tx, options, &new.task, &new.labels, &new.dependencies))
                .collect()
        })
    }

    /// Get a task by ID. Absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        get_task(&self.conn, id)
    }

    /// Check if a task ID exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn task_exists(&self, id: &str) -> Result<bool> {
        task_exists(&self.conn, id)
    }

    /// Apply a partial update and return the updated task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the task doesn't exist, or a
    /// validation error for bad field values.
    pub fn update_task(
        &mut self,
        id: &str,
        update: &TaskUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<Task> {
        self.mutate("update_task", |tx, _| {
            if !apply_task_update(tx, id, update, updated_at)? {
                return Err(StoreError::TaskNotFound { id: id.to_string() });
            }
            get_task(tx, id)?.ok_or_else(|| StoreError::TaskNotFound { id: id.to_string() })
        })
    }

    /// Close every listed task, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TasksNotFound`] naming every missing id; no task
    /// is changed in that case.
    pub fn close_tasks(&mut self, ids: &[String], closed_at: DateTime<Utc>) -> Result<usize> {
        self.mutate("close_tasks", |tx, _| close_tasks_in(tx, ids, closed_at))
    }

    /// Reopen every listed task, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TasksNotFound`] naming every missing id; no task
    /// is changed in that case.
    pub fn reopen_tasks(&mut self, ids: &[String], reopened_at: DateTime<Utc>) -> Result<usize> {
        self.mutate("reopen_tasks", |tx, _| {
            let ids = require_existing(tx, ids)?;
            for id in &ids {
                tx.execute(
                    "UPDATE tasks SET status = 'open', closed_at = NULL, updated_at = ? WHERE id = ?",
                    rusqlite::params![format_ts(&reopened_at), id],
                )?;
            }
            Ok(ids.len())
        })
    }

    /// Delete closed tasks last updated before `cutoff`.
    ///
    /// Labels, dependency edges, attachments and git references of deleted
    /// tasks go with them. With `dry_run` the candidates are reported and
    /// nothing changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is deleted.
    pub fn cleanup_closed_tasks(
        &mut self,
        cutoff: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<CleanupResult> {
        self.mutate("cleanup_closed_tasks", |tx, _| {
            let mut stmt = tx.prepare(
                "SELECT id FROM tasks WHERE status = 'closed' AND updated_at < ? ORDER BY id",
            )?;
            let task_ids = stmt
                .query_map([format_ts(&cutoff)], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            drop(stmt);

            if !dry_run {
                let mut delete = tx.prepare("DELETE FROM tasks WHERE id = ?")?;
                for id in &task_ids {
                    delete.execute([id])?;
                }
            }

            info!(count = task_ids.len(), dry_run, "Cleanup of closed tasks");
            Ok(CleanupResult {
                count: task_ids.len(),
                task_ids,
                dry_run,
            })
        })
    }

    /// Schema version and task counts by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_store_info(&self) -> Result<StoreInfo> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, count(*) FROM tasks GROUP BY status")?;
        let task_counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
        let total_tasks = task_counts.values().sum();

        Ok(StoreInfo {
            schema_version: self.schema_version()?,
            task_counts,
            total_tasks,
        })
    }
}

/// Insert one task row plus its labels and dependency edges.
pub(crate) fn insert_task(
    conn: &Connection,
    options: &StorageOptions,
    task: &Task,
    labels: &[String],
    deps: &[String],
) -> Result<String> {
    validate_new_task(task)?;

    let id = if task.id.trim().is_empty() {
        generate_id_checked(&options.id_prefix, |candidate| task_exists(conn, candidate))?
    } else {
        task.id.trim().to_string()
    };

    conn.execute(
        "INSERT INTO tasks (
            id, title, status, type, priority,
            description, notes, design, acceptance_criteria,
            spec_id, parent_id, assignee, source_repo, custom,
            created_at, updated_at, closed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            task.title,
            task.status.as_str(),
            task.task_type.as_str(),
            task.priority.0,
            task.description,
            task.notes,
            task.design,
            task.acceptance_criteria,
            task.spec_id,
            task.parent_id,
            task.assignee,
            task.source_repo,
            serde_json::to_string(&task.custom)?,
            format_ts(&task.created_at),
            format_ts(&task.updated_at),
            format_opt_ts(task.closed_at.as_ref()),
        ],
    )?;

    insert_labels(conn, &id, labels)?;
    for parent in deps {
        insert_dependency(conn, options, &id, parent, task.created_at)?;
    }

    debug!(id = %id, labels = labels.len(), deps = deps.len(), "Inserted task");
    Ok(id)
}

fn validate_new_task(task: &Task) -> Result<()> {
    if task.title.trim().is_empty() {
        return Err(StoreError::validation("title", "must not be empty"));
    }
    task.priority.validate()?;
    match (task.status, task.closed_at) {
        (Status::Closed, None) => Err(StoreError::validation(
            "closed_at",
            "closed tasks need a closed_at timestamp",
        )),
        (status, Some(_)) if status != Status::Closed => Err(StoreError::validation(
            "closed_at",
            format!("must be empty for {status} tasks"),
        )),
        _ => Ok(()),
    }
}

/// Apply a partial update. Returns false when no row has that id.
pub(crate) fn apply_task_update(
    conn: &Connection,
    id: &str,
    update: &TaskUpdate,
    updated_at: DateTime<Utc>,
) -> Result<bool> {
    let mut set_clauses: Vec<&str> = vec![];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

    let mut add_update = |clause: &'static str, val: Box<dyn rusqlite::ToSql>| {
        set_clauses.push(clause);
        params.push(val);
    };

    if let Some(ref title) = update.title {
        if title.trim().is_empty() {
            return Err(StoreError::validation("title", "must not be empty"));
        }
        add_update("title = ?", Box::new(title.clone()));
    }

    // Plain text fields: an empty string clears them.
    if let Some(ref val) = update.description {
        add_update("description = ?", Box::new(val.clone()));
    }
    if let Some(ref val) = update.notes {
        add_update("notes = ?", Box::new(val.clone()));
    }
    if let Some(ref val) = update.design {
        add_update("design = ?", Box::new(val.clone()));
    }
    if let Some(ref val) = update.acceptance_criteria {
        add_update("acceptance_criteria = ?", Box::new(val.clone()));
    }

    // Nullable fields: an empty string stores NULL.
    if let Some(ref val) = update.spec_id {
        add_update("spec_id = ?", Box::new(non_empty(val)));
    }
    if let Some(ref val) = update.parent_id {
        add_update("parent_id = ?", Box::new(non_empty(val)));
    }
    if let Some(ref val) = update.assignee {
        add_update("assignee = ?", Box::new(non_empty(val)));
    }
    if let Some(ref val) = update.source_repo {
        add_update("source_repo = ?", Box::new(non_empty(val)));
    }

    if let Some(priority) = update.priority {
        add_update("priority = ?", Box::new(priority.validate()?.0));
    }
    if let Some(task_type) = update.task_type {
        add_update("type = ?", Box::new(task_type.as_str()));
    }
    if let Some(ref custom) = update.custom {
        add_update("custom = ?", Box::new(serde_json::to_string(custom)?));
    }

    // Status changes keep closed_at in step with the status.
    if let Some(status) = update.status {
        add_update("status = ?", Box::new(status.as_str()));
        if status == Status::Closed {
            add_update("closed_at = COALESCE(closed_at, ?)", Box::new(format_ts(&updated_at)));
        } else {
            set_clauses.push("closed_at = NULL");
        }
    }

    // Always update updated_at
    set_clauses.push("updated_at = ?");
    params.push(Box::new(format_ts(&updated_at)));

    let sql = format!("UPDATE tasks SET {} WHERE id = ?", set_clauses.join(", "));
    params.push(Box::new(id.to_string()));

    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = conn.execute(&sql, params_refs.as_slice())?;
    Ok(rows > 0)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Close tasks after checking that every id exists.
pub(crate) fn close_tasks_in(
    conn: &Connection,
    ids: &[String],
    closed_at: DateTime<Utc>,
) -> Result<usize> {
    let ids = require_existing(conn, ids)?;
    let ts = format_ts(&closed_at);
    for id in &ids {
        conn.execute(
            "UPDATE tasks SET status = 'closed', closed_at = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![ts, ts, id],
        )?;
    }
    Ok(ids.len())
}

/// Deduplicate `ids` (keeping order) and fail if any is missing.
pub(crate) fn require_existing(conn: &Connection, ids: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();

    let mut missing = Vec::new();
    for id in &unique {
        if !task_exists(conn, id)? {
            missing.push(id.clone());
        }
    }
    if missing.is_empty() {
        Ok(unique)
    } else {
        Err(StoreError::TasksNotFound { ids: missing })
    }
}

pub(crate) fn task_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .prepare_cached("SELECT 1 FROM tasks WHERE id = ?")?
        .exists([id])?;
    Ok(found)
}

pub(crate) fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?");
    let task = conn.query_row(&sql, [id], task_from_row).optional()?;
    Ok(task)
}

pub(crate) fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        status: enum_column(row, 2)?,
        task_type: enum_column(row, 3)?,
        priority: crate::model::Priority(row.get(4)?),
        description: row.get(5)?,
        notes: row.get(6)?,
        design: row.get(7)?,
        acceptance_criteria: row.get(8)?,
        spec_id: row.get(9)?,
        parent_id: row.get(10)?,
        assignee: row.get(11)?,
        source_repo: row.get(12)?,
        custom: json_column(row, 13)?,
        created_at: ts_column(row, 14)?,
        updated_at: ts_column(row, 15)?,
        closed_at: opt_ts_column(row, 16)?,
    })
}

/// Parse a text column through `FromStr`.
pub(crate) fn enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = StoreError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|err: StoreError| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

/// Parse a JSON object column.
pub(crate) fn json_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: Option<String> = row.get(idx)?;
    match raw.as_deref() {
        None | Some("") => Ok(Metadata::new()),
        Some(raw) => serde_json::from_str(raw).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        }),
    }
}
