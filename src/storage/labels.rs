//! Task labels.
//!
//! Labels are stored normalized (trimmed, lower-cased) with one row per
//! `(task_id, label)`, so adding an existing label is a no-op.

use crate::error::{Result, StoreError};
use crate::storage::sqlite::{SqliteStorage, task_exists};
use crate::util::{normalize_label, normalize_labels};
use rusqlite::Connection;
use std::collections::HashMap;

/// Maximum ids bound into one `IN (...)` list.
pub(crate) const ID_CHUNK: usize = 500;

pub(crate) fn insert_labels(conn: &Connection, task_id: &str, labels: &[String]) -> Result<usize> {
    let mut stmt = conn.prepare_cached("INSERT OR IGNORE INTO labels (task_id, label) VALUES (?, ?)")?;
    let mut added = 0;
    for label in normalize_labels(labels) {
        added += stmt.execute(rusqlite::params![task_id, label])?;
    }
    Ok(added)
}

/// Replace the whole label set of a task. Returns the stored set.
pub(crate) fn replace_labels_in(
    conn: &Connection,
    task_id: &str,
    labels: &[String],
) -> Result<Vec<String>> {
    if !task_exists(conn, task_id)? {
        return Err(StoreError::TaskNotFound {
            id: task_id.to_string(),
        });
    }
    conn.execute("DELETE FROM labels WHERE task_id = ?", [task_id])?;
    insert_labels(conn, task_id, labels)?;
    get_labels(conn, task_id)
}

pub(crate) fn get_labels(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT label FROM labels WHERE task_id = ? ORDER BY label")?;
    let labels = stmt
        .query_map([task_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(labels)
}

impl SqliteStorage {
    /// Add a label. Returns false if the task already had it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown task, or a
    /// validation error for a blank label.
    pub fn add_label(&self, task_id: &str, label: &str) -> Result<bool> {
        let label =
            normalize_label(label).ok_or_else(|| StoreError::validation("label", "must not be empty"))?;
        if !task_exists(&self.conn, task_id)? {
            return Err(StoreError::TaskNotFound {
                id: task_id.to_string(),
            });
        }
        Ok(insert_labels(&self.conn, task_id, &[label])? > 0)
    }

    /// Remove a label. Returns false if it wasn't there.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_label(&self, task_id: &str, label: &str) -> Result<bool> {
        let Some(label) = normalize_label(label) else {
            return Ok(false);
        };
        let rows = self.conn.execute(
            "DELETE FROM labels WHERE task_id = ? AND label = ?",
            rusqlite::params![task_id, label],
        )?;
        Ok(rows > 0)
    }

    /// Replace a task's labels atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown task.
    pub fn set_labels(&mut self, task_id: &str, labels: &[String]) -> Result<Vec<String>> {
        self.mutate("set_labels", |tx, _| replace_labels_in(tx, task_id, labels))
    }

    /// Labels of one task, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_labels(&self, task_id: &str) -> Result<Vec<String>> {
        get_labels(&self.conn, task_id)
    }

    /// Labels for many tasks at once. Tasks without labels are absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_labels_for_tasks(&self, task_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for chunk in task_ids.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT task_id, label FROM labels WHERE task_id IN ({placeholders}) \
                 ORDER BY task_id, label"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (task_id, label) = row?;
                map.entry(task_id).or_default().push(label);
            }
        }
        Ok(map)
    }

    /// Every distinct label with its task count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn label_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label, count(*) FROM labels GROUP BY label ORDER BY label")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}
