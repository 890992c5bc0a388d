//! Git repositories and task references to git objects.

use crate::error::{Result, StoreError, is_unique_violation};
use crate::model::{CloseTaskGitRefInput, GitObjectType, GitRepo, TaskGitRef, TaskGitRefInput};
use crate::storage::sqlite::{SqliteStorage, close_tasks_in, enum_column, json_column};
use crate::util::id::generate_id_checked;
use crate::util::time::{format_ts, ts_column};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

const REPO_PREFIX: &str = "gr";
const REF_PREFIX: &str = "gf";

const REPO_COLUMNS: &str = "id, slug, default_branch, created_at, updated_at";

const REF_SELECT: &str = "SELECT r.id, r.task_id, r.repo_id, g.slug, r.relation, r.object_type, \
     r.object_value, r.resolved_commit, r.note, r.meta, r.created_at, r.updated_at \
     FROM task_git_refs r JOIN git_repos g ON g.id = r.repo_id";

fn repo_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GitRepo> {
    Ok(GitRepo {
        id: row.get(0)?,
        slug: row.get(1)?,
        default_branch: row.get(2)?,
        created_at: ts_column(row, 3)?,
        updated_at: ts_column(row, 4)?,
    })
}

fn git_ref_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskGitRef> {
    Ok(TaskGitRef {
        id: row.get(0)?,
        task_id: row.get(1)?,
        repo_id: row.get(2)?,
        repo: row.get(3)?,
        relation: row.get(4)?,
        object_type: enum_column(row, 5)?,
        object_value: row.get(6)?,
        resolved_commit: row.get(7)?,
        note: row.get(8)?,
        meta: json_column(row, 9)?,
        created_at: ts_column(row, 10)?,
        updated_at: ts_column(row, 11)?,
    })
}

fn normalize_slug(slug: &str) -> Result<String> {
    let slug = slug.trim().to_lowercase();
    if slug.is_empty() {
        Err(StoreError::validation("slug", "must not be empty"))
    } else {
        Ok(slug)
    }
}

fn get_repo_by_slug(conn: &Connection, slug: &str) -> Result<Option<GitRepo>> {
    let sql = format!("SELECT {REPO_COLUMNS} FROM git_repos WHERE slug = ?");
    Ok(conn.query_row(&sql, [slug], repo_from_row).optional()?)
}

fn get_git_ref(conn: &Connection, id: &str) -> Result<Option<TaskGitRef>> {
    let sql = format!("{REF_SELECT} WHERE r.id = ?");
    Ok(conn.query_row(&sql, [id], git_ref_from_row).optional()?)
}

/// Insert one reference.
///
/// Returns `Ok(None)` when the same annotation already exists; every other
/// failure is an error.
pub(crate) fn insert_git_ref(
    conn: &Connection,
    input: &TaskGitRefInput,
    now: DateTime<Utc>,
) -> Result<Option<String>> {
    if input.task_id.trim().is_empty() {
        return Err(StoreError::validation("task_id", "must not be empty"));
    }
    if input.repo_id.trim().is_empty() {
        return Err(StoreError::validation("repo_id", "must not be empty"));
    }
    let relation = input.relation.trim();
    if relation.is_empty() {
        return Err(StoreError::validation("relation", "must not be empty"));
    }
    let object_type: GitObjectType = input.object_type.parse()?;
    let object_value = input.object_value.trim();
    if object_value.is_empty() {
        return Err(StoreError::validation("object_value", "must not be empty"));
    }

    let id = generate_id_checked(REF_PREFIX, |candidate| {
        Ok(conn
            .prepare_cached("SELECT 1 FROM task_git_refs WHERE id = ?")?
            .exists([candidate])?)
    })?;

    let ts = format_ts(&now);
    let result = conn.execute(
        "INSERT INTO task_git_refs (
            id, task_id, repo_id, relation, object_type, object_value,
            resolved_commit, note, meta, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            input.task_id.trim(),
            input.repo_id.trim(),
            relation,
            object_type.as_str(),
            object_value,
            input.resolved_commit,
            input.note,
            serde_json::to_string(&input.meta)?,
            ts,
            ts,
        ],
    );

    match result {
        Ok(_) => Ok(Some(id)),
        Err(err) if is_unique_violation(&err) => {
            debug!(task_id = %input.task_id, relation, "Git reference already recorded");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Pair each task id with exactly one annotation, before anything is written.
fn match_annotations<'a>(
    ids: &[String],
    refs: &'a [CloseTaskGitRefInput],
) -> Result<Vec<&'a CloseTaskGitRefInput>> {
    let mut by_task: HashMap<&str, &CloseTaskGitRefInput> = HashMap::new();
    for input in refs {
        if by_task.insert(input.task_id.as_str(), input).is_some() {
            return Err(StoreError::validation(
                "refs",
                format!("more than one annotation for {}", input.task_id),
            ));
        }
    }

    let mut seen = HashSet::new();
    let mut ordered = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let input = by_task.get(id.as_str()).ok_or_else(|| {
            StoreError::validation("refs", format!("missing git annotation for {id}"))
        })?;
        ordered.push(*input);
    }

    if let Some(extra) = refs.iter().find(|r| !seen.contains(r.task_id.as_str())) {
        return Err(StoreError::validation(
            "refs",
            format!("annotation for {} which is not being closed", extra.task_id),
        ));
    }
    Ok(ordered)
}

impl SqliteStorage {
    /// Insert or refresh a repository by slug.
    ///
    /// An existing slug keeps its id; only `default_branch` (when given) and
    /// `updated_at` change.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty slug.
    pub fn upsert_git_repo(
        &mut self,
        slug: &str,
        default_branch: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GitRepo> {
        let slug = normalize_slug(slug)?;
        let default_branch = default_branch.map(str::trim).filter(|b| !b.is_empty());

        self.mutate("upsert_git_repo", |tx, _| {
            let id = generate_id_checked(REPO_PREFIX, |candidate| {
                Ok(tx
                    .prepare_cached("SELECT 1 FROM git_repos WHERE id = ?")?
                    .exists([candidate])?)
            })?;
            let ts = format_ts(&now);
            tx.execute(
                "INSERT INTO git_repos (id, slug, default_branch, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(slug) DO UPDATE SET
                    default_branch = COALESCE(excluded.default_branch, git_repos.default_branch),
                    updated_at = excluded.updated_at",
                rusqlite::params![id, slug, default_branch, ts, ts],
            )?;
            get_repo_by_slug(tx, &slug)?
                .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_git_repo(&self, id: &str) -> Result<Option<GitRepo>> {
        let sql = format!("SELECT {REPO_COLUMNS} FROM git_repos WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], repo_from_row).optional()?)
    }

    /// Look a repository up by slug (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_git_repo_by_slug(&self, slug: &str) -> Result<Option<GitRepo>> {
        get_repo_by_slug(&self.conn, &slug.trim().to_lowercase())
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_git_repos(&self) -> Result<Vec<GitRepo>> {
        let sql = format!("SELECT {REPO_COLUMNS} FROM git_repos ORDER BY slug");
        let mut stmt = self.conn.prepare(&sql)?;
        let repos = stmt
            .query_map([], repo_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    /// Link a task to a git object.
    ///
    /// Returns `None` if the identical link already exists.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty fields or an unknown object type,
    /// or an engine error for an unknown task or repository.
    pub fn add_task_git_ref(
        &mut self,
        input: &TaskGitRefInput,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskGitRef>> {
        self.mutate("add_task_git_ref", |tx, _| {
            match insert_git_ref(tx, input, now)? {
                Some(id) => get_git_ref(tx, &id),
                None => Ok(None),
            }
        })
    }

    /// References of one task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_task_git_refs(&self, task_id: &str) -> Result<Vec<TaskGitRef>> {
        let sql = format!("{REF_SELECT} WHERE r.task_id = ? ORDER BY r.created_at, r.id");
        let mut stmt = self.conn.prepare(&sql)?;
        let refs = stmt
            .query_map([task_id], git_ref_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn delete_task_git_ref(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM task_git_refs WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    /// Close tasks and record one git annotation per task, atomically.
    ///
    /// Every id needs exactly one entry in `refs`. An annotation that already
    /// exists is skipped; any other failure rolls back the closes as well.
    /// Returns the number of annotations created.
    ///
    /// # Errors
    ///
    /// Returns a validation error when annotations and ids don't pair up
    /// (nothing runs), [`StoreError::TasksNotFound`] for unknown tasks, or
    /// the first insertion error.
    pub fn close_tasks_with_git_refs(
        &mut self,
        ids: &[String],
        closed_at: DateTime<Utc>,
        refs: &[CloseTaskGitRefInput],
    ) -> Result<usize> {
        let annotations = match_annotations(ids, refs)?;

        self.mutate("close_tasks_with_git_refs", |tx, _| {
            close_tasks_in(tx, ids, closed_at)?;

            let mut created = 0;
            for input in annotations {
                if insert_git_ref(tx, input, closed_at)?.is_some() {
                    created += 1;
                }
            }
            info!(tasks = ids.len(), created, "Closed tasks with git references");
            Ok(created)
        })
    }
}
