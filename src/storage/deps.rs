//! Dependency edges and the bidirectional tree walk.
//!
//! Edges are `(child_id, parent_id, type)` rows meaning "child is blocked by
//! parent". Cycles longer than one edge are accepted at write time; the walk
//! tolerates them by never revisiting a task already on the current path.

use crate::config::StorageOptions;
use crate::error::{Result, StoreError};
use crate::model::{Dependency, DependencyType, Status, TaskType, TreeDirection, TreeNode};
use crate::storage::labels::ID_CHUNK;
use crate::storage::sqlite::{SqliteStorage, enum_column, task_exists};
use crate::util::project_of;
use crate::util::time::{format_ts, ts_column};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

/// Insert one `blocks` edge. Returns false if it already existed.
///
/// Endpoint existence is left to the deferred foreign keys so a batch can
/// link tasks it creates later.
pub(crate) fn insert_dependency(
    conn: &Connection,
    options: &StorageOptions,
    child_id: &str,
    parent_id: &str,
    created_at: DateTime<Utc>,
) -> Result<bool> {
    let child_id = child_id.trim();
    let parent_id = parent_id.trim();
    if child_id.is_empty() || parent_id.is_empty() {
        return Err(StoreError::validation("dependency", "ids must not be empty"));
    }
    if child_id == parent_id {
        return Err(StoreError::validation(
            "dependency",
            format!("{child_id} cannot depend on itself"),
        ));
    }
    if options.enforce_project_scope && project_of(child_id) != project_of(parent_id) {
        return Err(StoreError::ProjectMismatch {
            from: child_id.to_string(),
            from_project: project_of(child_id).to_string(),
            to: parent_id.to_string(),
            to_project: project_of(parent_id).to_string(),
        });
    }

    let rows = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO dependencies (child_id, parent_id, type, created_at)
             VALUES (?, ?, ?, ?)",
        )?
        .execute(rusqlite::params![
            child_id,
            parent_id,
            DependencyType::Blocks.as_str(),
            format_ts(&created_at)
        ])?;
    Ok(rows > 0)
}

pub(crate) fn remove_dependencies_of(conn: &Connection, child_id: &str) -> Result<usize> {
    let rows = conn.execute("DELETE FROM dependencies WHERE child_id = ?", [child_id])?;
    Ok(rows)
}

fn dependency_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        child_id: row.get(0)?,
        parent_id: row.get(1)?,
        dep_type: enum_column(row, 2)?,
        created_at: ts_column(row, 3)?,
    })
}

/// A neighbour reached over one edge.
struct Neighbor {
    id: String,
    title: String,
    status: Status,
    task_type: TaskType,
    edge_type: DependencyType,
}

/// Cached one-hop lookups for a single walk.
struct Walker<'a> {
    conn: &'a Connection,
    direction: TreeDirection,
    max_depth: usize,
    adjacency: HashMap<String, Vec<Neighbor>>,
    out: Vec<TreeNode>,
}

impl<'a> Walker<'a> {
    fn new(conn: &'a Connection, direction: TreeDirection, max_depth: usize) -> Self {
        Self {
            conn,
            direction,
            max_depth,
            adjacency: HashMap::new(),
            out: Vec::new(),
        }
    }

    fn load(&mut self, id: &str) -> Result<()> {
        if self.adjacency.contains_key(id) {
            return Ok(());
        }
        let sql = match self.direction {
            TreeDirection::Upstream => {
                "SELECT d.parent_id, t.title, t.status, t.type, d.type
                 FROM dependencies d JOIN tasks t ON t.id = d.parent_id
                 WHERE d.child_id = ? ORDER BY d.parent_id"
            }
            TreeDirection::Downstream => {
                "SELECT d.child_id, t.title, t.status, t.type, d.type
                 FROM dependencies d JOIN tasks t ON t.id = d.child_id
                 WHERE d.parent_id = ? ORDER BY d.child_id"
            }
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let neighbors = stmt
            .query_map([id], |row| {
                Ok(Neighbor {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    status: enum_column(row, 2)?,
                    task_type: enum_column(row, 3)?,
                    edge_type: enum_column(row, 4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.adjacency.insert(id.to_string(), neighbors);
        Ok(())
    }

    /// Depth-first expansion; `path` holds the tasks between origin and `id`.
    ///
    /// What a node emits depends on the path that reached it, so every path
    /// is expanded. The depth cap bounds the walk.
    fn visit(&mut self, id: &str, depth: usize, path: &mut Vec<String>) -> Result<()> {
        if depth > self.max_depth {
            return Ok(());
        }
        self.load(id)?;

        let next: Vec<String> = self.adjacency[id]
            .iter()
            .filter(|n| !path.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();

        for neighbor in &self.adjacency[id] {
            if path.contains(&neighbor.id) {
                continue;
            }
            self.out.push(TreeNode {
                id: neighbor.id.clone(),
                title: neighbor.title.clone(),
                status: neighbor.status,
                task_type: neighbor.task_type,
                depth,
                direction: self.direction,
                edge_type: neighbor.edge_type,
            });
        }

        if depth < self.max_depth {
            for child in next {
                path.push(child.clone());
                self.visit(&child, depth + 1, path)?;
                path.pop();
            }
        }
        Ok(())
    }
}

fn walk(
    conn: &Connection,
    origin: &str,
    direction: TreeDirection,
    max_depth: usize,
) -> Result<Vec<TreeNode>> {
    let mut walker = Walker::new(conn, direction, max_depth);
    let mut path = vec![origin.to_string()];
    walker.visit(origin, 1, &mut path)?;
    Ok(walker.out)
}

impl SqliteStorage {
    /// Record that `child_id` is blocked by `parent_id`.
    ///
    /// Returns false if the edge already existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown endpoint, a
    /// validation error for a self-dependency, or
    /// [`StoreError::ProjectMismatch`] when project scoping is enforced.
    pub fn add_dependency(&mut self, child_id: &str, parent_id: &str) -> Result<bool> {
        self.mutate("add_dependency", |tx, options| {
            for id in [child_id, parent_id] {
                if !task_exists(tx, id.trim())? {
                    return Err(StoreError::TaskNotFound { id: id.to_string() });
                }
            }
            insert_dependency(tx, options, child_id, parent_id, Utc::now())
        })
    }

    /// Remove one edge. Returns false if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn remove_dependency(&self, child_id: &str, parent_id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM dependencies WHERE child_id = ? AND parent_id = ?",
            rusqlite::params![child_id, parent_id],
        )?;
        Ok(rows > 0)
    }

    /// Remove every edge where `child_id` is the blocked side.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn remove_dependencies(&self, child_id: &str) -> Result<usize> {
        remove_dependencies_of(&self.conn, child_id)
    }

    /// Edges where `child_id` is blocked, ordered by parent id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependencies(&self, child_id: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT child_id, parent_id, type, created_at FROM dependencies
             WHERE child_id = ? ORDER BY parent_id",
        )?;
        let deps = stmt
            .query_map([child_id], dependency_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Edges where `parent_id` blocks something, ordered by child id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependents(&self, parent_id: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT child_id, parent_id, type, created_at FROM dependencies
             WHERE parent_id = ? ORDER BY child_id",
        )?;
        let deps = stmt
            .query_map([parent_id], dependency_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Outgoing edges for many tasks, keyed by child id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependencies_for_tasks(
        &self,
        child_ids: &[String],
    ) -> Result<HashMap<String, Vec<Dependency>>> {
        let mut map: HashMap<String, Vec<Dependency>> = HashMap::new();
        for chunk in child_ids.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT child_id, parent_id, type, created_at FROM dependencies
                 WHERE child_id IN ({placeholders}) ORDER BY child_id, parent_id"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk), dependency_from_row)?;
            for dep in rows {
                let dep = dep?;
                map.entry(dep.child_id.clone()).or_default().push(dep);
            }
        }
        Ok(map)
    }

    /// Walk the graph both ways from `id`.
    ///
    /// Every task reachable within the configured depth cap appears once per
    /// distinct depth it is reached at. Output is ordered by direction, then
    /// depth, then id. The origin itself is never listed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if `id` doesn't exist.
    pub fn get_dependency_tree(&self, id: &str) -> Result<Vec<TreeNode>> {
        if !task_exists(&self.conn, id)? {
            return Err(StoreError::TaskNotFound { id: id.to_string() });
        }
        let max_depth = self.options.max_tree_depth;

        let mut nodes = walk(&self.conn, id, TreeDirection::Downstream, max_depth)?;
        nodes.extend(walk(&self.conn, id, TreeDirection::Upstream, max_depth)?);

        nodes.sort_by(|a, b| {
            (a.direction, a.depth, &a.id).cmp(&(b.direction, b.depth, &b.id))
        });
        nodes.dedup_by(|a, b| a.direction == b.direction && a.depth == b.depth && a.id == b.id);

        debug!(origin = id, nodes = nodes.len(), "Dependency tree walked");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;

    fn storage_with(ids: &[&str]) -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        for id in ids {
            storage
                .create_task(&Task::new(*id, format!("Task {id}"), Utc::now()), &[], &[])
                .unwrap();
        }
        storage
    }

    #[test]
    fn add_dependency_is_idempotent() {
        let mut storage = storage_with(&["ts-a", "ts-b"]);
        assert!(storage.add_dependency("ts-a", "ts-b").unwrap());
        assert!(!storage.add_dependency("ts-a", "ts-b").unwrap());
        assert_eq!(storage.get_dependencies("ts-a").unwrap().len(), 1);
        assert_eq!(storage.get_dependents("ts-b").unwrap()[0].child_id, "ts-a");
    }

    #[test]
    fn self_dependency_rejected() {
        let mut storage = storage_with(&["ts-a"]);
        let err = storage.add_dependency("ts-a", "ts-a").unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn unknown_endpoint_rejected() {
        let mut storage = storage_with(&["ts-a"]);
        let err = storage.add_dependency("ts-a", "ts-zz").unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound { ref id } if id == "ts-zz"));
    }

    #[test]
    fn project_scope_enforced_when_enabled() {
        let options = StorageOptions {
            enforce_project_scope: true,
            ..StorageOptions::default()
        };
        let mut storage = SqliteStorage::open_memory_with_options(options).unwrap();
        for id in ["ts-a", "other-b"] {
            storage
                .create_task(&Task::new(id, "Scoped", Utc::now()), &[], &[])
                .unwrap();
        }
        let err = storage.add_dependency("ts-a", "other-b").unwrap_err();
        assert!(matches!(err, StoreError::ProjectMismatch { .. }));
    }

    #[test]
    fn tree_tolerates_cycles() {
        let mut storage = storage_with(&["ts-a", "ts-b", "ts-c"]);
        storage.add_dependency("ts-a", "ts-b").unwrap();
        storage.add_dependency("ts-b", "ts-c").unwrap();
        storage.add_dependency("ts-c", "ts-a").unwrap();

        let tree = storage.get_dependency_tree("ts-a").unwrap();
        let upstream: Vec<(&str, usize)> = tree
            .iter()
            .filter(|n| n.direction == TreeDirection::Upstream)
            .map(|n| (n.id.as_str(), n.depth))
            .collect();
        assert_eq!(upstream, vec![("ts-b", 1), ("ts-c", 2)]);
        assert!(tree.iter().all(|n| n.id != "ts-a"));
    }

    #[test]
    fn isolated_task_has_empty_tree() {
        let storage = storage_with(&["ts-a"]);
        assert!(storage.get_dependency_tree("ts-a").unwrap().is_empty());
    }
}
