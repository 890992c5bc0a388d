//! Filtered task listing, full-text search, ready and stale queries.
//!
//! Every filter field maps to one predicate appended to a `WHERE 1=1` base.
//! A text query switches the base to a join against the FTS index and orders
//! by relevance; otherwise results are newest-updated first.

use crate::error::{Result, StoreError};
use crate::model::{Priority, Status, Task, TaskType};
use crate::storage::sqlite::{SqliteStorage, TASK_COLUMNS, task_from_row};
use crate::util::normalize_labels;
use crate::util::time::format_ts;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt::Write as _;
use tracing::trace;

/// Filter options for listing tasks. Empty fields don't constrain.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub statuses: Vec<Status>,
    pub types: Vec<TaskType>,
    pub priority: Option<Priority>,
    pub priority_min: Option<Priority>,
    pub priority_max: Option<Priority>,
    pub ids: Vec<String>,
    pub parent_id: Option<String>,
    /// Task must carry every one of these labels.
    pub labels_all: Vec<String>,
    /// Task must carry at least one of these labels.
    pub labels_any: Vec<String>,
    pub no_labels: bool,
    pub assignee: Option<String>,
    pub unassigned: bool,
    pub title_contains: Option<String>,
    pub description_contains: Option<String>,
    pub notes_contains: Option<String>,
    pub empty_description: bool,
    /// Inclusive lower bound.
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub closed_after: Option<DateTime<Utc>>,
    pub closed_before: Option<DateTime<Utc>>,
    /// Full-text query over title, description and notes.
    pub query: Option<String>,
    /// Regular expression matched against `spec_id`.
    pub spec_id_pattern: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Filter options for the ready queue.
#[derive(Debug, Clone, Default)]
pub struct ReadyFilter {
    pub assignee: Option<String>,
    pub unassigned: bool,
    pub types: Vec<TaskType>,
    pub labels_any: Vec<String>,
    pub limit: Option<usize>,
}

/// Accumulated `AND` predicates and their positional parameters.
#[derive(Default)]
struct Predicates {
    sql: String,
    params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl Predicates {
    fn push(&mut self, clause: &str) {
        let _ = write!(self.sql, " AND {clause}");
    }

    fn push_param<T: rusqlite::ToSql + 'static>(&mut self, clause: &str, value: T) {
        self.push(clause);
        self.params.push(Box::new(value));
    }

    /// `column IN (?, ?, ...)`; no-op for an empty list.
    fn push_in<T: rusqlite::ToSql + 'static>(&mut self, column: &str, values: Vec<T>) {
        if values.is_empty() {
            return;
        }
        let placeholders = vec!["?"; values.len()].join(",");
        self.push(&format!("{column} IN ({placeholders})"));
        for value in values {
            self.params.push(Box::new(value));
        }
    }

    fn push_like(&mut self, column: &str, needle: &str) {
        self.push_param(
            &format!("{column} LIKE ? ESCAPE '\\'"),
            format!("%{}%", escape_like(needle)),
        );
    }

    fn push_ts(&mut self, column: &str, op: &str, ts: Option<&DateTime<Utc>>) {
        if let Some(ts) = ts {
            self.push_param(&format!("{column} {op} ?"), format_ts(ts));
        }
    }

    fn run(self, conn: &rusqlite::Connection, sql: &str) -> Result<Vec<Task>> {
        trace!(sql, params = self.params.len(), "Running task query");
        let mut stmt = conn.prepare(sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            self.params.iter().map(AsRef::as_ref).collect();
        let tasks = stmt
            .query_map(params_refs.as_slice(), task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Turn free text into an FTS5 query that matches every token literally.
///
/// Returns `None` when there is nothing to search for.
#[must_use]
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn apply_filter(filter: &ListFilter, preds: &mut Predicates) {
    preds.push_in(
        "t.status",
        filter.statuses.iter().map(Status::as_str).collect(),
    );
    preds.push_in(
        "t.type",
        filter.types.iter().map(TaskType::as_str).collect(),
    );
    preds.push_in("t.id", filter.ids.clone());

    if let Some(priority) = filter.priority {
        preds.push_param("t.priority = ?", priority.0);
    }
    if let Some(priority) = filter.priority_min {
        preds.push_param("t.priority >= ?", priority.0);
    }
    if let Some(priority) = filter.priority_max {
        preds.push_param("t.priority <= ?", priority.0);
    }
    if let Some(ref parent) = filter.parent_id {
        preds.push_param("t.parent_id = ?", parent.clone());
    }

    apply_assignee(filter.assignee.as_deref(), filter.unassigned, preds);

    for label in normalize_labels(&filter.labels_all) {
        preds.push_param(
            "EXISTS (SELECT 1 FROM labels l WHERE l.task_id = t.id AND l.label = ?)",
            label,
        );
    }
    apply_labels_any(&filter.labels_any, preds);
    if filter.no_labels {
        preds.push("NOT EXISTS (SELECT 1 FROM labels l WHERE l.task_id = t.id)");
    }

    if let Some(ref needle) = filter.title_contains {
        preds.push_like("t.title", needle);
    }
    if let Some(ref needle) = filter.description_contains {
        preds.push_like("t.description", needle);
    }
    if let Some(ref needle) = filter.notes_contains {
        preds.push_like("t.notes", needle);
    }
    if filter.empty_description {
        preds.push("trim(t.description) = ''");
    }

    preds.push_ts("t.created_at", ">=", filter.created_after.as_ref());
    preds.push_ts("t.created_at", "<", filter.created_before.as_ref());
    preds.push_ts("t.updated_at", ">=", filter.updated_after.as_ref());
    preds.push_ts("t.updated_at", "<", filter.updated_before.as_ref());
    preds.push_ts("t.closed_at", ">=", filter.closed_after.as_ref());
    preds.push_ts("t.closed_at", "<", filter.closed_before.as_ref());
}

fn apply_assignee(assignee: Option<&str>, unassigned: bool, preds: &mut Predicates) {
    if let Some(assignee) = assignee {
        preds.push_param("t.assignee = ?", assignee.to_string());
    }
    if unassigned {
        preds.push("(t.assignee IS NULL OR t.assignee = '')");
    }
}

fn apply_labels_any(labels: &[String], preds: &mut Predicates) {
    let labels = normalize_labels(labels);
    if labels.is_empty() {
        return;
    }
    let placeholders = vec!["?"; labels.len()].join(",");
    preds.push(&format!(
        "EXISTS (SELECT 1 FROM labels l WHERE l.task_id = t.id AND l.label IN ({placeholders}))"
    ));
    for label in labels {
        preds.params.push(Box::new(label));
    }
}

fn push_limit_offset(sql: &mut String, limit: Option<usize>, offset: Option<usize>) {
    // SQLite reads integer literals past i64::MAX as REAL and rejects them.
    let clamp = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
    match (limit.map(clamp), offset.filter(|o| *o > 0).map(clamp)) {
        (Some(limit), Some(offset)) => {
            let _ = write!(sql, " LIMIT {limit} OFFSET {offset}");
        }
        (Some(limit), None) => {
            let _ = write!(sql, " LIMIT {limit}");
        }
        (None, Some(offset)) => {
            let _ = write!(sql, " LIMIT -1 OFFSET {offset}");
        }
        (None, None) => {}
    }
}

impl SqliteStorage {
    /// List tasks matching `filter`.
    ///
    /// With a text query results are ranked by relevance; otherwise by
    /// `updated_at` descending. A `spec_id_pattern` is applied before
    /// offset and limit.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid `spec_id_pattern`, or an
    /// engine error if the query fails.
    pub fn list_tasks(&self, filter: &ListFilter) -> Result<Vec<Task>> {
        let spec_re = filter
            .spec_id_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|err| StoreError::validation("spec_id_pattern", err.to_string()))
            })
            .transpose()?;

        let mut preds = Predicates::default();
        let mut sql = match filter.query.as_deref().and_then(fts_query) {
            Some(match_expr) => {
                preds.params.push(Box::new(match_expr));
                format!(
                    "SELECT {TASK_COLUMNS} FROM tasks_fts \
                     JOIN tasks t ON t.rowid = tasks_fts.rowid \
                     WHERE tasks_fts MATCH ?"
                )
            }
            None => format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE 1=1"),
        };
        let ranked = !preds.params.is_empty();

        apply_filter(filter, &mut preds);
        sql.push_str(&preds.sql);

        if ranked {
            sql.push_str(" ORDER BY bm25(tasks_fts), t.updated_at DESC, t.id");
        } else {
            sql.push_str(" ORDER BY t.updated_at DESC, t.id");
        }

        let Some(spec_re) = spec_re else {
            push_limit_offset(&mut sql, filter.limit, filter.offset);
            return preds.run(&self.conn, &sql);
        };

        let tasks = preds
            .run(&self.conn, &sql)?
            .into_iter()
            .filter(|task| task.spec_id.as_deref().is_some_and(|s| spec_re.is_match(s)))
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(tasks)
    }

    /// Tasks in an actionable status with no actionable blocker.
    ///
    /// Ordered by priority, then age.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_ready_tasks(&self, filter: &ReadyFilter) -> Result<Vec<Task>> {
        let actionable: Vec<&'static str> = self
            .options
            .statuses
            .actionable
            .iter()
            .map(Status::as_str)
            .collect();

        let mut preds = Predicates::default();
        preds.push_in("t.status", actionable.clone());

        if !actionable.is_empty() {
            let placeholders = vec!["?"; actionable.len()].join(",");
            preds.push(&format!(
                "NOT EXISTS (SELECT 1 FROM dependencies d \
                 JOIN tasks p ON p.id = d.parent_id \
                 WHERE d.child_id = t.id AND d.type = 'blocks' \
                 AND p.status IN ({placeholders}))"
            ));
            for status in actionable {
                preds.params.push(Box::new(status));
            }
        }

        apply_assignee(filter.assignee.as_deref(), filter.unassigned, &mut preds);
        preds.push_in(
            "t.type",
            filter.types.iter().map(TaskType::as_str).collect(),
        );
        apply_labels_any(&filter.labels_any, &mut preds);

        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE 1=1{}", preds.sql);
        sql.push_str(" ORDER BY t.priority ASC, t.created_at ASC, t.id ASC");
        push_limit_offset(&mut sql, filter.limit, None);

        preds.run(&self.conn, &sql)
    }

    /// Tasks not updated since `cutoff`, oldest first.
    ///
    /// An empty `statuses` slice means every status outside the configured
    /// stale exclusion set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_stale_tasks(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[Status],
        limit: Option<usize>,
    ) -> Result<Vec<Task>> {
        let mut preds = Predicates::default();
        preds.push_param("t.updated_at < ?", format_ts(&cutoff));

        if statuses.is_empty() {
            let excluded: Vec<&'static str> = self
                .options
                .statuses
                .stale_excluded
                .iter()
                .map(Status::as_str)
                .collect();
            if !excluded.is_empty() {
                let placeholders = vec!["?"; excluded.len()].join(",");
                preds.push(&format!("t.status NOT IN ({placeholders})"));
                for status in excluded {
                    preds.params.push(Box::new(status));
                }
            }
        } else {
            preds.push_in("t.status", statuses.iter().map(Status::as_str).collect());
        }

        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE 1=1{}", preds.sql);
        sql.push_str(" ORDER BY t.updated_at ASC, t.id ASC");
        push_limit_offset(&mut sql, limit, None);

        preds.run(&self.conn, &sql)
    }
}
